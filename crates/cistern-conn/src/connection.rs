//! Physical connection and driver traits.
//!
//! A [`Connection`] is the raw, driver-level handle to the backing store.
//! A [`Driver`] opens them. Both are object-safe so the pool can manage
//! connections from any driver behind `Box<dyn Connection>`.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::isolation::IsolationLevel;

/// The operation surface of a physical database connection.
///
/// Implementations are driven by exactly one caller at a time; the pool
/// serializes access to a pooled connection through its wrapper.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a statement that returns no rows.
    ///
    /// Returns the number of affected rows.
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Commit the current transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the current transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Whether the connection is in auto-commit mode.
    fn auto_commit(&self) -> bool;

    /// Enable or disable auto-commit.
    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;

    /// Apply a transaction isolation level.
    async fn set_isolation(&mut self, level: IsolationLevel) -> Result<()>;

    /// Close the connection gracefully.
    ///
    /// Further operations fail with [`crate::ConnError::Closed`].
    async fn close(&mut self) -> Result<()>;

    /// Whether the connection has been closed.
    fn is_closed(&self) -> bool;
}

/// Opens brand-new physical connections.
///
/// This is the seam between the pool and a concrete database driver. The
/// pool owns a driver instance by injection; there is no process-wide driver
/// registry. Each `connect` call is independent, so implementations must be
/// safe to call concurrently.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open a fresh connection to `url`.
    ///
    /// `properties` carries driver-specific settings plus the `user` and
    /// `password` entries assembled by the caller.
    async fn connect(
        &self,
        url: &str,
        properties: &HashMap<String, String>,
    ) -> Result<Box<dyn Connection>>;
}
