//! Error types for the command server

use thiserror::Error;

/// Errors that can occur in the command server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] aesd_storage::StorageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server not started
    #[error("Server not started")]
    NotStarted,

    /// Server already started
    #[error("Server already started")]
    AlreadyStarted,

    /// Peer did not answer in time
    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Io(e.to_string())
    }
}

impl From<toml::de::Error> for ServerError {
    fn from(e: toml::de::Error) -> Self {
        ServerError::Config(e.to_string())
    }
}

/// Result type alias for server operations
pub type ServerResult<T> = Result<T, ServerError>;
