//! Error types for Conneg

use std::io;
use thiserror::Error;

/// Result type for Conneg operations
pub type Result<T> = std::result::Result<T, ConnegError>;

/// Errors that can occur in Conneg
#[derive(Debug, Error)]
pub enum ConnegError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Connector parameter with a value that cannot be parsed
    #[error("Invalid value {value:?} for connector parameter '{name}'")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Raw value found in the parameter map
        value: String,
    },

    /// Malformed language tag, media type or character set
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Outbound message without a matching in-flight request
    #[error("No in-flight request for message {0}")]
    UnknownMessage(u64),

    /// Connector used in a state that does not allow the operation
    #[error("Connector is {0}")]
    InvalidState(String),
}
