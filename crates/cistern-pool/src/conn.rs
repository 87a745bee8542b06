//! Pooled connection record and caller-facing wrapper.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;

use cistern_conn::{Connection, IsolationLevel};

use crate::error::{PoolError, Result};
use crate::pool::PoolInner;

/// The managed record behind one physical connection.
///
/// Shared between the caller's [`PooledConnection`] wrapper and the pool's
/// idle/active lists. The physical connection lives behind its own async
/// mutex so the pool can move it out during forced reclamation; a wrapper
/// whose record has lost its physical connection degrades to
/// [`PoolError::ConnectionInvalid`] instead of touching a stolen connection.
pub(crate) struct PooledRecord {
    id: u64,
    type_code: u64,
    epoch: Instant,
    created_ms: u64,
    last_used_ms: AtomicU64,
    checked_out_ms: AtomicU64,
    valid: AtomicBool,
    pub(crate) raw: AsyncMutex<Option<Box<dyn Connection>>>,
}

impl PooledRecord {
    /// Wrap a freshly opened physical connection.
    pub(crate) fn open(
        id: u64,
        type_code: u64,
        epoch: Instant,
        raw: Box<dyn Connection>,
    ) -> Self {
        let now = epoch.elapsed().as_millis() as u64;
        Self {
            id,
            type_code,
            epoch,
            created_ms: now,
            last_used_ms: AtomicU64::new(now),
            checked_out_ms: AtomicU64::new(now),
            valid: AtomicBool::new(true),
            raw: AsyncMutex::new(Some(raw)),
        }
    }

    /// Re-wrap the physical connection of a reclaimed record.
    ///
    /// Identity and creation/last-used timestamps carry over so that age
    /// accounting and identity-keyed tracking survive the reclaim.
    pub(crate) fn adopt(previous: &PooledRecord, raw: Box<dyn Connection>) -> Self {
        Self {
            id: previous.id,
            type_code: previous.type_code,
            epoch: previous.epoch,
            created_ms: previous.created_ms,
            last_used_ms: AtomicU64::new(previous.last_used_ms.load(Ordering::Relaxed)),
            checked_out_ms: AtomicU64::new(previous.checked_out_ms.load(Ordering::Relaxed)),
            valid: AtomicBool::new(true),
            raw: AsyncMutex::new(Some(raw)),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Identity of the physical connection this record wraps.
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Fingerprint of the connect options this connection was opened under.
    pub(crate) fn type_code(&self) -> u64 {
        self.type_code
    }

    /// Mark the record invalid. Idempotent.
    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    /// Whether the validity flag is still set.
    pub(crate) fn is_valid_flag(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// Record a checkout: both checkout and last-used timestamps move to now.
    pub(crate) fn mark_checked_out(&self) {
        let now = self.now_ms();
        self.checked_out_ms.store(now, Ordering::SeqCst);
        self.last_used_ms.store(now, Ordering::SeqCst);
    }

    /// Refresh the last-used timestamp.
    pub(crate) fn touch_last_used(&self) {
        self.last_used_ms.store(self.now_ms(), Ordering::SeqCst);
    }

    /// Time since the physical connection was opened.
    pub(crate) fn age(&self) -> Duration {
        Duration::from_millis(self.now_ms().saturating_sub(self.created_ms))
    }

    /// Time since the connection was last used.
    pub(crate) fn idle_time(&self) -> Duration {
        Duration::from_millis(
            self.now_ms()
                .saturating_sub(self.last_used_ms.load(Ordering::SeqCst)),
        )
    }

    /// Time since the connection was last checked out.
    pub(crate) fn checkout_time(&self) -> Duration {
        Duration::from_millis(
            self.now_ms()
                .saturating_sub(self.checked_out_ms.load(Ordering::SeqCst)),
        )
    }

    /// Move the physical connection out of the record, if still present.
    pub(crate) async fn take_raw(&self) -> Option<Box<dyn Connection>> {
        self.raw.lock().await.take()
    }
}

impl std::fmt::Debug for PooledRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledRecord")
            .field("id", &self.id)
            .field("type_code", &self.type_code)
            .field("valid", &self.is_valid_flag())
            .finish_non_exhaustive()
    }
}

/// A connection checked out from a [`crate::Pool`].
///
/// Behaves like the raw connection for every operation except release:
/// [`PooledConnection::release`] (and [`PooledConnection::close`], its alias)
/// hand the physical connection back to the pool instead of closing it.
/// Dropping the wrapper without releasing returns it on a spawned task.
///
/// Every forwarded operation checks the wrapper's validity first; a wrapper
/// that has been invalidated (failed probe, forced reclaim) fails with
/// [`PoolError::ConnectionInvalid`]. Identity and timestamp accessors never
/// fail.
pub struct PooledConnection {
    id: u64,
    record: Option<Arc<PooledRecord>>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    pub(crate) fn new(record: Arc<PooledRecord>, pool: Arc<PoolInner>) -> Self {
        Self {
            id: record.id(),
            record: Some(record),
            pool,
        }
    }

    fn record(&self) -> Result<&Arc<PooledRecord>> {
        self.record.as_ref().ok_or(PoolError::ConnectionInvalid)
    }

    /// Lock the physical connection after the validity checks.
    async fn raw(
        &self,
    ) -> Result<tokio::sync::MutexGuard<'_, Option<Box<dyn Connection>>>> {
        let record = self.record()?;
        if !record.is_valid_flag() {
            return Err(PoolError::ConnectionInvalid);
        }
        let guard = record.raw.lock().await;
        if guard.is_none() {
            return Err(PoolError::ConnectionInvalid);
        }
        Ok(guard)
    }

    /// Execute a statement that returns no rows.
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        let mut guard = self.raw().await?;
        let conn = guard.as_mut().ok_or(PoolError::ConnectionInvalid)?;
        Ok(conn.execute(sql).await?)
    }

    /// Commit the current transaction.
    pub async fn commit(&mut self) -> Result<()> {
        let mut guard = self.raw().await?;
        let conn = guard.as_mut().ok_or(PoolError::ConnectionInvalid)?;
        Ok(conn.commit().await?)
    }

    /// Roll back the current transaction.
    pub async fn rollback(&mut self) -> Result<()> {
        let mut guard = self.raw().await?;
        let conn = guard.as_mut().ok_or(PoolError::ConnectionInvalid)?;
        Ok(conn.rollback().await?)
    }

    /// Whether the connection is in auto-commit mode.
    pub async fn auto_commit(&self) -> Result<bool> {
        let guard = self.raw().await?;
        let conn = guard.as_ref().ok_or(PoolError::ConnectionInvalid)?;
        Ok(conn.auto_commit())
    }

    /// Enable or disable auto-commit.
    pub async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        let mut guard = self.raw().await?;
        let conn = guard.as_mut().ok_or(PoolError::ConnectionInvalid)?;
        Ok(conn.set_auto_commit(auto_commit).await?)
    }

    /// Apply a transaction isolation level.
    pub async fn set_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        let mut guard = self.raw().await?;
        let conn = guard.as_mut().ok_or(PoolError::ConnectionInvalid)?;
        Ok(conn.set_isolation(level).await?)
    }

    /// Identity of the underlying physical connection.
    ///
    /// Two wrappers compare equal exactly when they wrap the same physical
    /// connection; the identity survives release and forced reclamation.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the wrapper is still valid.
    ///
    /// Turns false after a failed probe or a forced reclaim.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.record
            .as_ref()
            .is_some_and(|record| record.is_valid_flag())
    }

    /// Time since the physical connection was opened.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.record
            .as_ref()
            .map(|record| record.age())
            .unwrap_or_default()
    }

    /// Time since the connection was last used.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.record
            .as_ref()
            .map(|record| record.idle_time())
            .unwrap_or_default()
    }

    /// Time since this checkout began.
    #[must_use]
    pub fn checkout_time(&self) -> Duration {
        self.record
            .as_ref()
            .map(|record| record.checkout_time())
            .unwrap_or_default()
    }

    /// Return the connection to the pool.
    ///
    /// Always succeeds; validation errors are absorbed into the pool's
    /// bad-connection accounting.
    pub async fn release(mut self) {
        if let Some(record) = self.record.take() {
            self.pool.push(record).await;
        }
    }

    /// Alias for [`PooledConnection::release`].
    ///
    /// Does not close the physical connection; the pool decides whether it
    /// is retained or discarded.
    pub async fn close(self) {
        self.release().await;
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(record) = self.record.take() else {
            return;
        };
        let pool = self.pool.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                pool.push(record).await;
            });
        } else {
            // No runtime to run the release on. Untrack and drop the
            // physical connection; its own Drop severs the link.
            tracing::warn!(
                id = record.id(),
                "pooled connection dropped outside a runtime; discarding"
            );
            record.invalidate();
            pool.untrack(&record);
        }
    }
}

impl PartialEq for PooledConnection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PooledConnection {}

impl std::hash::Hash for PooledConnection {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}
