//! `chamada` - QR code attendance check-in
//!
//! This library provides the scan gate of the attendance app: admission
//! control over a noisy camera stream, QR payload validation, device
//! location, submission to the attendance endpoint and the transient banner
//! reporting each outcome.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod camera;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod device;
pub mod error;
pub mod gate;
pub mod logging;
pub mod notify;
pub mod payload;
pub mod screen;
pub mod session;
pub mod storage;
pub mod submit;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{Error, Result};
pub use gate::{Admission, AdmissionGate, GateState, GateTimings};
pub use logging::init_logging;
pub use payload::ScanPayload;
pub use screen::{Platform, ScanScreen, ScreenExit, ScreenOptions};
pub use storage::{SharedStorage, Storage};
