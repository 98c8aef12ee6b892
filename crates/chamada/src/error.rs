//! Error types for chamada.
//!
//! This module defines all error types used throughout the chamada crate.
//! Scan-path variants are converted into banners by the scanner screen and
//! never escape it; the rest surface from commands and bootstrap.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for chamada operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Scan Errors ===
    /// The scanned text is not a JSON object of the expected shape.
    #[error("malformed QR payload: {reason}")]
    MalformedPayload {
        /// What made the payload unreadable.
        reason: String,
    },

    /// The scanned payload parsed but a required field is absent.
    #[error("incomplete QR payload: missing '{field}'")]
    IncompletePayload {
        /// Name of the missing field as it appears in the QR payload.
        field: &'static str,
    },

    /// The device position is not known yet (or could not be resolved).
    #[error("device location unavailable")]
    LocationUnavailable,

    /// The attendance endpoint answered with a non-2xx status.
    #[error("attendance rejected with status {status}: {message}")]
    RemoteRejection {
        /// HTTP status code.
        status: u16,
        /// Message taken from the response body, or a generic fallback.
        message: String,
    },

    /// No response was received at all.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// A device capability was refused by the user.
    #[error("permission denied: {capability}")]
    PermissionDenied {
        /// Name of the refused capability.
        capability: &'static str,
    },

    // === Session Errors ===
    /// A value the scanner needs was never stored by the login flow.
    #[error("missing stored credential '{key}'; run `chamada login` first")]
    MissingCredential {
        /// Storage key that was empty.
        key: &'static str,
    },

    /// The stored or supplied session token could not be decoded.
    #[error("invalid session token: {0}")]
    InvalidToken(String),

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Platform Errors ===
    /// A device capability failed in a way that is not a refusal.
    #[error("platform error: {0}")]
    Platform(String),

    /// Building the HTTP client failed.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for chamada operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new malformed payload error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            reason: reason.into(),
        }
    }

    /// Create a new incomplete payload error.
    #[must_use]
    pub fn incomplete(field: &'static str) -> Self {
        Self::IncompletePayload { field }
    }

    /// Create a new network failure error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkFailure(message.into())
    }

    /// Create a new platform error.
    #[must_use]
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error belongs to a single scan attempt.
    ///
    /// Scan errors end the attempt with a banner; they never stop the screen.
    #[must_use]
    pub fn is_scan_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedPayload { .. }
                | Self::IncompletePayload { .. }
                | Self::LocationUnavailable
                | Self::RemoteRejection { .. }
                | Self::NetworkFailure(_)
        )
    }

    /// Check if this error short-circuits before any network call.
    #[must_use]
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            Self::MalformedPayload { .. } | Self::IncompletePayload { .. } | Self::LocationUnavailable
        )
    }

    /// Check if this error is a permission issue.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}
