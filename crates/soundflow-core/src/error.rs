//! Error types for the engine
use thiserror::Error;

/// Engine and configuration errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed or out-of-range preset document; prior state is kept
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Audio source could not be selected or started
    #[error("Audio unavailable: {0}")]
    AudioUnavailable(String),

    /// Error from the wire layer
    #[error(transparent)]
    Control(#[from] soundflow_control::ControlError),

    /// Standard IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/Deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, CoreError>;
