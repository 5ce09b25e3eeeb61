//! Error types for the control/wire layer
use thiserror::Error;

/// Wire protocol and transport errors
#[derive(Error, Debug)]
pub enum ControlError {
    /// Malformed or truncated OSC packet
    #[error("OSC decode error: {0}")]
    OscDecode(String),

    /// Invalid OSC address or message template
    #[error("Invalid OSC address: {0}")]
    InvalidAddress(String),

    /// Unsupported OSC type tag encountered while decoding
    #[error("Unsupported OSC type tag '{0}'")]
    UnsupportedTypeTag(char),

    /// Transport failure (socket unavailable, send failed)
    #[error("Transport error: {0}")]
    Transport(String),

    /// TCP endpoint is not connected and a reconnect is not yet due
    #[error("Not connected to {0}")]
    NotConnected(String),

    /// Standard IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/Deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for control operations
pub type Result<T> = std::result::Result<T, ControlError>;
