//! Pool error types.

use std::time::Duration;

use thiserror::Error;

use cistern_conn::ConnError;

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors that can occur while acquiring or using a pooled connection.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No connection became available within the configured checkout timeout.
    ///
    /// A rising bad-connection count alongside repeated timeouts indicates
    /// resource exhaustion or a broken backing store; surface it as an
    /// operational alert rather than retrying blindly.
    #[error("checkout timed out after {waited:?} ({bad_connections} bad connections seen)")]
    CheckoutTimeout {
        /// How long the caller waited.
        waited: Duration,
        /// Accumulated bad-connection detections at the time of the timeout.
        bad_connections: u64,
    },

    /// Operation attempted on a connection whose wrapper has been
    /// invalidated (released, force-reclaimed, or failed a probe).
    #[error("connection is invalid")]
    ConnectionInvalid,

    /// The underlying source failed to establish a new physical connection.
    ///
    /// Propagated directly to the caller of acquire; the pool does not
    /// retry, so a systemic outage is not masked.
    #[error("connection source error: {0}")]
    Source(#[from] ConnError),

    /// The pool has been closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Invalid pool configuration.
    #[error("configuration error: {0}")]
    Config(String),
}
