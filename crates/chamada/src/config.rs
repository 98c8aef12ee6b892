//! Configuration management for chamada.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "chamada";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "chamada.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CHAMADA_`)
/// 2. TOML config file at `~/.config/chamada/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Attendance endpoint configuration.
    pub api: ApiConfig,
    /// Scan gate timing.
    pub gate: GateConfig,
    /// Banner timing.
    pub banner: BannerConfig,
    /// Device location handling.
    pub location: LocationConfig,
    /// Terminal camera emulation.
    pub camera: CameraConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
}

/// Attendance endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL; `/chamada/alunos` is appended.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// Scan gate timing, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum time between an acceptance (or release) and the next admission.
    pub quiet_interval_ms: u64,
    /// Time after which a gate stuck waiting on a response is force re-armed.
    pub failsafe_interval_ms: u64,
    /// How long the success banner stays before leaving the scanner.
    pub success_delay_ms: u64,
}

/// Banner timing, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BannerConfig {
    /// Time a banner stays fully visible.
    pub hold_ms: u64,
    /// Duration of the fade-out.
    pub fade_ms: u64,
}

/// What to do with scans when the device position could not be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationPolicy {
    /// Refuse scans until a position is known.
    #[default]
    Block,
    /// Submit with null student coordinates.
    AllowNull,
}

/// Device location handling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Scan policy when the position is unknown.
    pub policy: LocationPolicy,
    /// Fixed latitude reported by the terminal front-end.
    pub latitude: Option<f64>,
    /// Fixed longitude reported by the terminal front-end.
    pub longitude: Option<f64>,
}

/// Terminal camera emulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// How many detections each input line produces.
    pub repeat: u32,
    /// Interval between repeated detections in milliseconds.
    pub frame_interval_ms: u64,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/chamada/chamada.db`
    pub database_path: Option<PathBuf>,
    /// Maximum number of journaled attempts to retain.
    /// Set to 0 for unlimited.
    pub max_attempts: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://projeto-iii-4.vercel.app".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            quiet_interval_ms: 3_000,
            failsafe_interval_ms: 10_000,
            success_delay_ms: 3_000,
        }
    }
}

impl Default for BannerConfig {
    fn default() -> Self {
        Self {
            hold_ms: 5_000,
            fade_ms: 500,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            repeat: 5,
            frame_interval_ms: 100,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            max_attempts: 1_000,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("CHAMADA_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://"))
        {
            return Err(Error::ConfigValidation {
                message: format!("api.base_url must be an http(s) URL: {}", self.api.base_url),
            });
        }

        if self.api.timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "api.timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.gate.quiet_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "gate.quiet_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.gate.failsafe_interval_ms <= self.gate.quiet_interval_ms {
            return Err(Error::ConfigValidation {
                message: format!(
                    "gate.failsafe_interval_ms ({}) must be greater than gate.quiet_interval_ms ({})",
                    self.gate.failsafe_interval_ms, self.gate.quiet_interval_ms
                ),
            });
        }

        if self.banner.hold_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "banner.hold_ms must be greater than 0".to_string(),
            });
        }

        if self.camera.repeat == 0 {
            return Err(Error::ConfigValidation {
                message: "camera.repeat must be at least 1".to_string(),
            });
        }

        if self.location.latitude.is_some() != self.location.longitude.is_some() {
            return Err(Error::ConfigValidation {
                message: "location.latitude and location.longitude must be set together"
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Full URL of the attendance endpoint.
    #[must_use]
    pub fn attendance_url(&self) -> String {
        format!("{}/chamada/alunos", self.api.base_url.trim_end_matches('/'))
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Get the frame interval of the terminal camera as a Duration.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.camera.frame_interval_ms)
    }
}

impl GateConfig {
    /// Get the quiet interval as a Duration.
    #[must_use]
    pub fn quiet_interval(&self) -> Duration {
        Duration::from_millis(self.quiet_interval_ms)
    }

    /// Get the fail-safe interval as a Duration.
    #[must_use]
    pub fn failsafe_interval(&self) -> Duration {
        Duration::from_millis(self.failsafe_interval_ms)
    }

    /// Get the success delay as a Duration.
    #[must_use]
    pub fn success_delay(&self) -> Duration {
        Duration::from_millis(self.success_delay_ms)
    }
}

impl BannerConfig {
    /// Get the hold duration as a Duration.
    #[must_use]
    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    /// Get the fade duration as a Duration.
    #[must_use]
    pub fn fade(&self) -> Duration {
        Duration::from_millis(self.fade_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.gate.quiet_interval(), Duration::from_secs(3));
        assert_eq!(config.gate.failsafe_interval(), Duration::from_secs(10));
        assert_eq!(config.gate.success_delay(), Duration::from_secs(3));
        assert_eq!(config.banner.hold(), Duration::from_secs(5));
        assert_eq!(config.banner.fade(), Duration::from_millis(500));
        assert_eq!(config.location.policy, LocationPolicy::Block);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let mut config = Config::default();
        config.api.base_url = "ftp://example.com".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("api.base_url"));
    }

    #[test]
    fn test_validate_rejects_failsafe_below_quiet() {
        let mut config = Config::default();
        config.gate.failsafe_interval_ms = 2_000;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("failsafe_interval_ms"));
    }

    #[test]
    fn test_validate_rejects_zero_quiet_interval() {
        let mut config = Config::default();
        config.gate.quiet_interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("quiet_interval_ms"));
    }

    #[test]
    fn test_validate_rejects_zero_repeat() {
        let mut config = Config::default();
        config.camera.repeat = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_half_fixed_location() {
        let mut config = Config::default();
        config.location.latitude = Some(-15.6);

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("set together"));
    }

    #[test]
    fn test_attendance_url_trims_trailing_slash() {
        let mut config = Config::default();
        config.api.base_url = "http://localhost:3000/".to_string();

        assert_eq!(
            config.attendance_url(),
            "http://localhost:3000/chamada/alunos"
        );
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config.database_path().to_string_lossy().contains("chamada.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("chamada"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), Config::default());
    }

    #[test]
    fn test_load_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [gate]
            quiet_interval_ms = 1500

            [location]
            policy = "allow_null"
            "#,
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.gate.quiet_interval_ms, 1_500);
        assert_eq!(config.gate.failsafe_interval_ms, 10_000);
        assert_eq!(config.location.policy, LocationPolicy::AllowNull);
    }

    #[test]
    fn test_location_policy_serialize() {
        let json = serde_json::to_string(&LocationPolicy::AllowNull).unwrap();
        assert_eq!(json, "\"allow_null\"");
    }
}
