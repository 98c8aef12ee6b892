//! Device capabilities used by the scanner screen.
//!
//! Geolocation, permissions and navigation belong to the platform. The
//! screen only sees these traits; the terminal front-end and the tests
//! provide their own implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
}

impl Coordinates {
    /// Create coordinates.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

/// Capabilities that require user consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Camera access.
    Camera,
    /// Foreground location access.
    Location,
}

impl Capability {
    /// Name used in errors and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Location => "location",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Answer to a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    /// The user allowed it.
    Granted,
    /// The user refused it.
    Denied,
}

impl PermissionStatus {
    /// Whether the capability may be used.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Asks the user for capability permissions.
#[async_trait]
pub trait PermissionProbe: Send + Sync {
    /// Request `capability`; may suspend while the system dialog is open.
    async fn request(&self, capability: Capability) -> PermissionStatus;
}

/// Point-in-time position query.
#[async_trait]
pub trait Geolocator: Send + Sync {
    /// Current device position.
    ///
    /// # Errors
    ///
    /// Returns an error if the position cannot be determined.
    async fn current_position(&self) -> Result<Coordinates>;
}

/// Screens the scanner can leave to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Profile/home screen, optionally showing a message on arrival.
    Home {
        /// Message for the home screen's banner.
        message: Option<String>,
    },
}

/// Fire-and-forget screen transitions.
pub trait Navigator: Send {
    /// Leave the current screen for `route`.
    fn navigate(&mut self, route: Route);
}

/// Permissions decided up front (terminal front-end).
#[derive(Debug, Clone, Copy)]
pub struct StaticPermissions {
    camera: PermissionStatus,
    location: PermissionStatus,
}

impl StaticPermissions {
    /// Grant or deny each capability.
    #[must_use]
    pub fn new(camera: bool, location: bool) -> Self {
        let status = |granted| {
            if granted {
                PermissionStatus::Granted
            } else {
                PermissionStatus::Denied
            }
        };
        Self {
            camera: status(camera),
            location: status(location),
        }
    }
}

#[async_trait]
impl PermissionProbe for StaticPermissions {
    async fn request(&self, capability: Capability) -> PermissionStatus {
        match capability {
            Capability::Camera => self.camera,
            Capability::Location => self.location,
        }
    }
}

/// Reports a configured position, or fails when none is configured.
#[derive(Debug, Clone, Copy)]
pub struct FixedGeolocator {
    position: Option<Coordinates>,
}

impl FixedGeolocator {
    /// Report `position`.
    #[must_use]
    pub fn new(position: Option<Coordinates>) -> Self {
        Self { position }
    }
}

#[async_trait]
impl Geolocator for FixedGeolocator {
    async fn current_position(&self) -> Result<Coordinates> {
        self.position
            .ok_or_else(|| Error::platform("no position configured for this device"))
    }
}

/// Prints the destination of a transition.
#[derive(Debug, Default)]
pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&mut self, route: Route) {
        match route {
            Route::Home { message } => {
                info!("navigating to home");
                match message {
                    Some(message) => println!("== Home: {message}"),
                    None => println!("== Home"),
                }
            }
        }
    }
}
