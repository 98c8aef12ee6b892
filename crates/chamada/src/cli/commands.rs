//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::config::LocationPolicy;

/// Scan command arguments.
///
/// Each line read from the input is treated as a QR code held in front of
/// the camera.
#[derive(Debug, Args)]
pub struct ScanCommand {
    /// Read codes from this file instead of stdin
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Device latitude (overrides location.latitude)
    #[arg(long, requires = "long", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Device longitude (overrides location.longitude)
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub long: Option<f64>,

    /// Detections produced per input line (overrides camera.repeat)
    #[arg(short, long)]
    pub repeat: Option<u32>,

    /// Behave as if location permission was refused
    #[arg(long)]
    pub deny_location: bool,

    /// Behave as if camera permission was refused
    #[arg(long)]
    pub deny_camera: bool,

    /// What to do when the position is unknown (overrides location.policy)
    #[arg(long, value_enum)]
    pub location_policy: Option<LocationPolicyArg>,
}

/// Login command arguments.
#[derive(Debug, Args)]
pub struct LoginCommand {
    /// Session token issued by the attendance service
    pub token: String,
}

/// Profile command arguments.
#[derive(Debug, Args)]
pub struct ProfileCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// History command arguments.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Maximum number of attempts to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Location policy argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LocationPolicyArg {
    /// Refuse scans until a position is known
    Block,
    /// Submit with null student coordinates
    AllowNull,
}

impl From<LocationPolicyArg> for LocationPolicy {
    fn from(arg: LocationPolicyArg) -> Self {
        match arg {
            LocationPolicyArg::Block => Self::Block,
            LocationPolicyArg::AllowNull => Self::AllowNull,
        }
    }
}
