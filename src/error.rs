//! Error types for the leaky-gate service.

use std::time::Duration;
use thiserror::Error;

/// Main error type for leaky-gate operations.
///
/// Rejected requests are not errors; they are an ordinary
/// [`Admission`](crate::meter::Admission) outcome. This type only covers
/// startup and serving failures.
#[derive(Error, Debug)]
pub enum GateError {
    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure while reading or merging configuration sources
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// An admission mode that is recognized but has no implementation
    #[error("Admission mode not implemented: {0}")]
    UnsupportedMode(String),

    /// In-flight requests did not finish within the shutdown grace period
    #[error("Shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for leaky-gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
