//! Error types for the streaming application

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Sample source disconnected")]
    SourceDisconnected,
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Listener bind failed after {attempts} attempts: {reason}")]
    BindFailed { attempts: u32, reason: String },

    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
