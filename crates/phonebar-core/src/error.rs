//! Error types for PhoneBar

use thiserror::Error;

/// Main error type for PhoneBar
#[derive(Error, Debug)]
pub enum PhoneBarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Command rejected: {0}")]
    Rejected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for PhoneBar operations
pub type Result<T> = std::result::Result<T, PhoneBarError>;
