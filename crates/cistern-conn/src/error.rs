//! Connection-layer error types.

use thiserror::Error;

/// Result alias for connection-layer operations.
pub type Result<T> = std::result::Result<T, ConnError>;

/// Errors that can occur while establishing or driving a physical connection.
#[derive(Debug, Error)]
pub enum ConnError {
    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// The driver failed to establish or configure a connection.
    #[error("driver error: {0}")]
    Driver(String),

    /// IO error during connect or statement execution.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation attempted on a closed connection.
    #[error("connection closed")]
    Closed,

    /// The driver does not support the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}
