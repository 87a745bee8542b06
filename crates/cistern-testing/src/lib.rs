//! # cistern-testing
//!
//! In-memory stub driver and connection for exercising pool behavior without
//! a backing store.
//!
//! [`StubDriver`] opens [`StubConnection`]s instantly and keeps a probe to
//! every connection it has ever opened, so tests can make individual
//! connections unhealthy, make the next opens fail, or inspect recorded
//! rollbacks, closes, and executed statements.
//!
//! ## Example
//!
//! ```rust,ignore
//! let driver = StubDriver::new();
//! let pool = Pool::builder()
//!     .driver(driver.handle())
//!     .options(ConnectOptions::new("stub://test"))
//!     .build()?;
//!
//! let conn = pool.acquire().await?;
//! driver.connection(0).set_healthy(false);
//! conn.release().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use cistern_conn::{ConnError, Connection, Driver, IsolationLevel, Result};

/// Observable state of one stub connection.
///
/// Tests hold these through [`StubDriver::connection`] and flip or inspect
/// them while the pool owns the connection itself.
#[derive(Debug)]
pub struct StubConnectionState {
    serial: u64,
    healthy: AtomicBool,
    hang_executes: AtomicBool,
    closed: AtomicBool,
    auto_commit: AtomicBool,
    rollbacks: AtomicUsize,
    commits: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

impl StubConnectionState {
    fn new(serial: u64) -> Self {
        Self {
            serial,
            healthy: AtomicBool::new(true),
            hang_executes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            auto_commit: AtomicBool::new(true),
            rollbacks: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Serial number of this connection, in open order starting at 0.
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Make every subsequent statement on this connection fail (or succeed).
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Make every subsequent statement on this connection block forever.
    pub fn set_hang_executes(&self, hang: bool) {
        self.hang_executes.store(hang, Ordering::SeqCst);
    }

    /// Whether the connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of rollbacks issued on this connection.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Number of commits issued on this connection.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Statements executed on this connection, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

/// A scriptable in-memory connection.
pub struct StubConnection {
    state: Arc<StubConnectionState>,
}

impl StubConnection {
    fn check_usable(&self) -> Result<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(ConnError::Closed);
        }
        if !self.state.healthy.load(Ordering::SeqCst) {
            return Err(ConnError::Driver("stub connection is unhealthy".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for StubConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        if self.state.hang_executes.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(86_400)).await;
        }
        self.check_usable()?;
        self.state.executed.lock().push(sql.to_string());
        Ok(0)
    }

    async fn commit(&mut self) -> Result<()> {
        self.check_usable()?;
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.check_usable()?;
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.state.auto_commit.load(Ordering::SeqCst)
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.check_usable()?;
        self.state.auto_commit.store(auto_commit, Ordering::SeqCst);
        Ok(())
    }

    async fn set_isolation(&mut self, _level: IsolationLevel) -> Result<()> {
        self.check_usable()
    }

    async fn close(&mut self) -> Result<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

struct StubDriverState {
    next_serial: AtomicU64,
    connects: AtomicUsize,
    fail_next: AtomicUsize,
    connections: Mutex<Vec<Arc<StubConnectionState>>>,
}

/// A scriptable in-memory driver.
pub struct StubDriver {
    state: Arc<StubDriverState>,
}

impl StubDriver {
    /// Create a driver with no scripted failures.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(StubDriverState {
                next_serial: AtomicU64::new(0),
                connects: AtomicUsize::new(0),
                fail_next: AtomicUsize::new(0),
                connections: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A cloneable handle usable as `Arc<dyn Driver>`.
    #[must_use]
    pub fn handle(&self) -> Arc<dyn Driver> {
        Arc::new(Self {
            state: self.state.clone(),
        })
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.fail_next.store(count, Ordering::SeqCst);
    }

    /// Total successful connect calls so far.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// State of the `serial`-th opened connection.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `serial + 1` connections have been opened.
    #[must_use]
    pub fn connection(&self, serial: usize) -> Arc<StubConnectionState> {
        self.state.connections.lock()[serial].clone()
    }

    /// States of all opened connections, in open order.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<StubConnectionState>> {
        self.state.connections.lock().clone()
    }
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for StubDriver {
    async fn connect(
        &self,
        _url: &str,
        _properties: &HashMap<String, String>,
    ) -> Result<Box<dyn Connection>> {
        let fail = self.state.fail_next.load(Ordering::SeqCst);
        if fail > 0 {
            self.state.fail_next.store(fail - 1, Ordering::SeqCst);
            return Err(ConnError::Driver("stub connect refused".to_string()));
        }

        let serial = self.state.next_serial.fetch_add(1, Ordering::SeqCst);
        let state = Arc::new(StubConnectionState::new(serial));
        self.state.connections.lock().push(state.clone());
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubConnection { state }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_assigns_serials_in_order() {
        let driver = StubDriver::new();
        let props = HashMap::new();
        driver.connect("stub://x", &props).await.unwrap();
        driver.connect("stub://x", &props).await.unwrap();

        assert_eq!(driver.connects(), 2);
        assert_eq!(driver.connection(0).serial(), 0);
        assert_eq!(driver.connection(1).serial(), 1);
    }

    #[tokio::test]
    async fn test_scripted_connect_failures_drain() {
        let driver = StubDriver::new();
        let props = HashMap::new();
        driver.fail_next_connects(1);

        assert!(driver.connect("stub://x", &props).await.is_err());
        assert!(driver.connect("stub://x", &props).await.is_ok());
    }

    #[tokio::test]
    async fn test_unhealthy_connection_fails_statements() {
        let driver = StubDriver::new();
        let props = HashMap::new();
        let mut conn = driver.connect("stub://x", &props).await.unwrap();

        conn.execute("SELECT 1").await.unwrap();
        driver.connection(0).set_healthy(false);
        assert!(conn.execute("SELECT 1").await.is_err());
        assert_eq!(driver.connection(0).executed(), vec!["SELECT 1".to_string()]);
    }
}
