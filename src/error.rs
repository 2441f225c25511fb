//! # Error Types
//!
//! Custom error types for the telemetry node using `thiserror`.

use std::fmt;
use thiserror::Error;

/// Why a stored row was refused before any network attempt.
///
/// Logged as a diagnostic code whenever the drain skips a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadDefect {
    /// Row is blank after trimming
    Empty,
    /// Row carries alphabetic characters (a column header or garbage)
    HeaderLike,
    /// Row lacks the fixed date/time/location fields
    Malformed,
}

impl PayloadDefect {
    /// Stable short code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            PayloadDefect::Empty => "ROW_EMPTY",
            PayloadDefect::HeaderLike => "ROW_HEADER_LIKE",
            PayloadDefect::Malformed => "ROW_MALFORMED",
        }
    }
}

impl fmt::Display for PayloadDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Main error type for the telemetry node
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Expected token never showed up inside the collection window
    #[error("Transport timeout: no expected response to {command:?}")]
    TransportTimeout { command: String },

    /// Durable medium missing or unwritable
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Endpoint answered but without the success token
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    /// Row failed the sanity check before upload
    #[error("Invalid payload: {0}")]
    InvalidPayload(PayloadDefect),

    /// Date outside the range the file naming scheme can order
    #[error("Invalid date key: {0}")]
    InvalidDateKey(String),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No serial device could be opened
    #[error("Serial port not found (tried: {0})")]
    SerialPortNotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the telemetry node
pub type Result<T> = std::result::Result<T, TelemetryError>;
