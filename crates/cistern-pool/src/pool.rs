//! Connection pool implementation.
//!
//! The pool hands out reusable physical connections, tracks their
//! checkout/idle state, validates them on release, and reclaims abandoned
//! ones. All bookkeeping lives behind a single mutex held only for short,
//! non-I/O sections; waiting callers park on a [`Notify`] bounded by the
//! checkout timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Notify;

use cistern_conn::{ConnectOptions, Driver, UnpooledSource};

use crate::config::PoolConfig;
use crate::conn::{PooledConnection, PooledRecord};
use crate::error::{PoolError, Result};
use crate::prober::Prober;
use crate::state::{PoolMetrics, PoolState, PoolStatus};

/// A pool of reusable database connections.
///
/// Cloning is cheap; clones share the same underlying pool.
///
/// # Example
///
/// ```rust,ignore
/// use cistern_pool::{Pool, PoolConfig};
/// use cistern_conn::ConnectOptions;
///
/// let pool = Pool::builder()
///     .driver(driver)
///     .options(ConnectOptions::new("postgres://localhost/mydb"))
///     .max_active(20)
///     .max_idle(5)
///     .build()?;
///
/// let mut conn = pool.acquire().await?;
/// conn.execute("UPDATE jobs SET state = 'done' WHERE id = 7").await?;
/// conn.release().await;
/// ```
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Create a pool over the given driver and connect options.
    pub fn new(
        driver: Arc<dyn Driver>,
        options: ConnectOptions,
        config: PoolConfig,
    ) -> Result<Self> {
        config.validate()?;

        let expected_type_code = options.type_code();
        let source = UnpooledSource::new(driver.clone(), options);
        let inner = Arc::new(PoolInner {
            prober: Prober::from_config(&config),
            config,
            driver,
            source: Mutex::new(Arc::new(source)),
            state: Mutex::new(PoolState::new(expected_type_code)),
            available: Notify::new(),
            epoch: Instant::now(),
            next_id: AtomicU64::new(0),
        });

        tracing::info!(
            max_active = inner.config.max_active,
            max_idle = inner.config.max_idle,
            "connection pool created"
        );

        Ok(Self { inner })
    }

    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Acquire a connection.
    ///
    /// Reuses the most recently released idle connection when one exists,
    /// opens a new connection while under capacity, or waits until a
    /// connection is released. Waiting is bounded by the configured checkout
    /// timeout; on expiry the call fails with
    /// [`PoolError::CheckoutTimeout`].
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.inner.acquire().await
    }

    /// Swap the pool's connect options.
    ///
    /// New connections open against the new target immediately. Connections
    /// opened under the previous options are discarded lazily: the next time
    /// one is inspected (on release or on reuse from the idle list) its type
    /// code no longer matches and it is closed instead of handed out.
    pub fn reconfigure(&self, options: ConnectOptions) {
        self.inner.reconfigure(options);
    }

    /// Roll back and close every idle and active connection.
    ///
    /// Wrappers still held by callers observe
    /// [`PoolError::ConnectionInvalid`] afterwards. The pool itself stays
    /// usable; new acquires open fresh connections.
    pub async fn force_close_all(&self) {
        self.inner.force_close_all().await;
    }

    /// Close the pool.
    ///
    /// All pooled connections are closed and subsequent acquires fail with
    /// [`PoolError::PoolClosed`]. Waiting acquirers are woken.
    pub async fn close(&self) {
        self.inner.close().await;
    }

    /// Whether the pool has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Current occupancy of the pool.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            idle: state.idle.len(),
            active: state.active.len(),
            max: self.inner.config.max_active,
        }
    }

    /// Accumulated metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics::from_stats(&self.inner.state.lock().stats)
    }

    /// The pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

/// What the acquire loop decided to do with the lock released.
enum Plan {
    /// An idle connection was handed out.
    Ready(Arc<PooledRecord>),
    /// A popped idle connection belongs to a previous configuration.
    DiscardStale(Arc<PooledRecord>),
    /// A popped idle connection outlived the idle TTL.
    DiscardExpired(Arc<PooledRecord>),
    /// A capacity slot was reserved; open a new connection.
    Open,
    /// An overdue active connection was pulled for reclamation.
    Reclaim(Arc<PooledRecord>),
    /// Nothing available; park until a release or the deadline.
    Wait,
}

pub(crate) struct PoolInner {
    pub(crate) config: PoolConfig,
    driver: Arc<dyn Driver>,
    source: Mutex<Arc<UnpooledSource>>,
    pub(crate) state: Mutex<PoolState>,
    available: Notify,
    prober: Prober,
    epoch: Instant,
    next_id: AtomicU64,
}

impl PoolInner {
    async fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        let requested_at = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.checkout_timeout;
        let mut counted_wait = false;

        loop {
            let plan = {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(PoolError::PoolClosed);
                }

                if let Some(record) = state.idle.pop() {
                    if record.type_code() != state.expected_type_code {
                        Plan::DiscardStale(record)
                    } else if self
                        .config
                        .idle_ttl
                        .is_some_and(|ttl| record.idle_time() > ttl)
                    {
                        Plan::DiscardExpired(record)
                    } else {
                        if !state.idle.is_empty() {
                            // Pass the wake permit on; another waiter may
                            // still find an idle connection.
                            self.available.notify_one();
                        }
                        state.active.push(record.clone());
                        self.note_success(&mut state, &record, requested_at);
                        Plan::Ready(record)
                    }
                } else if state.active.len() + state.reserved < self.config.max_active {
                    state.reserved += 1;
                    Plan::Open
                } else if state
                    .active
                    .first()
                    .is_some_and(|oldest| oldest.checkout_time() > self.config.max_checkout_time)
                {
                    let record = state.active.remove(0);
                    let overdue = record.checkout_time();
                    state.stats.claimed_overdue_count += 1;
                    state.stats.accumulated_checkout_time_of_overdue += overdue;
                    state.stats.accumulated_checkout_time += overdue;
                    Plan::Reclaim(record)
                } else {
                    if !counted_wait {
                        state.stats.had_to_wait_count += 1;
                        counted_wait = true;
                    }
                    Plan::Wait
                }
            };

            match plan {
                Plan::Ready(record) => {
                    tracing::debug!(id = record.id(), "checked out idle connection");
                    return Ok(PooledConnection::new(record, self.clone()));
                }
                Plan::DiscardStale(record) => {
                    tracing::debug!(
                        id = record.id(),
                        "idle connection belongs to a previous pool configuration; discarding"
                    );
                    self.discard_bad(&record).await;
                }
                Plan::DiscardExpired(record) => {
                    tracing::debug!(
                        id = record.id(),
                        idle_ms = record.idle_time().as_millis() as u64,
                        "evicting idle connection past its time-to-live"
                    );
                    self.discard_quietly(&record, "idle ttl elapsed").await;
                }
                Plan::Open => return self.open_connection(requested_at).await,
                Plan::Reclaim(old) => {
                    if let Some(conn) = self.reclaim(old, requested_at).await? {
                        return Ok(conn);
                    }
                    // The holder released while we were stealing; retry.
                }
                Plan::Wait => {
                    tracing::debug!("pool exhausted; waiting for a connection");
                    let wait_start = Instant::now();
                    let woken =
                        tokio::time::timeout_at(deadline, self.available.notified()).await;
                    let bad_connections = {
                        let mut state = self.state.lock();
                        state.stats.accumulated_wait_time += wait_start.elapsed();
                        state.stats.bad_connection_count
                    };
                    if woken.is_err() {
                        tracing::warn!(
                            bad_connections,
                            timeout_ms = self.config.checkout_timeout.as_millis() as u64,
                            "checkout timed out waiting for a connection"
                        );
                        return Err(PoolError::CheckoutTimeout {
                            waited: self.config.checkout_timeout,
                            bad_connections,
                        });
                    }
                }
            }
        }
    }

    /// Open a new physical connection against a reserved capacity slot.
    async fn open_connection(self: &Arc<Self>, requested_at: Instant) -> Result<PooledConnection> {
        let source = self.source.lock().clone();
        match source.connect().await {
            Ok(raw) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let record = Arc::new(PooledRecord::open(
                    id,
                    source.options().type_code(),
                    self.epoch,
                    raw,
                ));
                let closed = {
                    let mut state = self.state.lock();
                    state.reserved -= 1;
                    if state.closed {
                        true
                    } else {
                        state.active.push(record.clone());
                        self.note_success(&mut state, &record, requested_at);
                        false
                    }
                };
                if closed {
                    self.discard_quietly(&record, "pool closed").await;
                    return Err(PoolError::PoolClosed);
                }
                tracing::debug!(id, "opened new pooled connection");
                Ok(PooledConnection::new(record, self.clone()))
            }
            Err(error) => {
                {
                    let mut state = self.state.lock();
                    state.reserved -= 1;
                }
                // The freed slot is usable by whoever is waiting.
                self.available.notify_one();
                tracing::warn!(error = %error, "failed to open new connection");
                Err(PoolError::Source(error))
            }
        }
    }

    /// Take over the physical connection of an overdue active record.
    ///
    /// Returns `Ok(None)` when the holder released concurrently and the
    /// record no longer owns a physical connection.
    async fn reclaim(
        self: &Arc<Self>,
        old: Arc<PooledRecord>,
        requested_at: Instant,
    ) -> Result<Option<PooledConnection>> {
        tracing::warn!(
            id = old.id(),
            checkout_ms = old.checkout_time().as_millis() as u64,
            "claiming overdue connection from a long-running checkout"
        );
        old.invalidate();
        let Some(mut raw) = old.take_raw().await else {
            return Ok(None);
        };
        if !raw.auto_commit() {
            if let Err(error) = raw.rollback().await {
                tracing::debug!(
                    id = old.id(),
                    error = %error,
                    "could not roll back reclaimed connection"
                );
            }
        }

        let record = Arc::new(PooledRecord::adopt(&old, raw));
        let closed = {
            let mut state = self.state.lock();
            if state.closed {
                true
            } else {
                state.active.push(record.clone());
                self.note_success(&mut state, &record, requested_at);
                false
            }
        };
        if closed {
            self.discard_quietly(&record, "pool closed").await;
            return Err(PoolError::PoolClosed);
        }
        Ok(Some(PooledConnection::new(record, self.clone())))
    }

    /// Return a released connection to the pool.
    ///
    /// Never propagates errors; a connection that fails inspection is
    /// closed and counted instead.
    pub(crate) async fn push(&self, record: Arc<PooledRecord>) {
        let expected = {
            let mut state = self.state.lock();
            let Some(pos) = state
                .active
                .iter()
                .position(|candidate| Arc::ptr_eq(candidate, &record))
            else {
                // Force-reclaimed or force-closed while checked out; the
                // reclaimer owns the physical connection now.
                tracing::debug!(
                    id = record.id(),
                    "released connection is no longer tracked; ignoring"
                );
                return;
            };
            state.active.remove(pos);
            state.stats.accumulated_checkout_time += record.checkout_time();
            if state.closed {
                None
            } else {
                Some(state.expected_type_code)
            }
        };

        let Some(expected) = expected else {
            self.discard_quietly(&record, "pool closed").await;
            return;
        };

        if record.type_code() != expected {
            tracing::warn!(
                id = record.id(),
                "released connection belongs to a previous pool configuration; discarding"
            );
            self.discard_bad(&record).await;
            return;
        }

        if !self.prober.is_valid(&record).await {
            tracing::warn!(
                id = record.id(),
                "released connection failed validation; discarding"
            );
            self.discard_bad(&record).await;
            return;
        }

        // Roll back uncommitted work before the connection can be reused.
        {
            let mut guard = record.raw.lock().await;
            let Some(raw) = guard.as_mut() else {
                return;
            };
            if !raw.auto_commit() {
                if let Err(error) = raw.rollback().await {
                    tracing::warn!(
                        id = record.id(),
                        error = %error,
                        "rollback on release failed; discarding connection"
                    );
                    drop(guard);
                    self.discard_bad(&record).await;
                    return;
                }
            }
        }

        let retained = {
            let mut state = self.state.lock();
            if state.closed {
                false
            } else if state.idle.len() < self.config.max_idle {
                record.touch_last_used();
                state.idle.push(record.clone());
                true
            } else {
                false
            }
        };

        if retained {
            tracing::debug!(id = record.id(), "returned connection to idle pool");
            self.available.notify_one();
        } else {
            tracing::debug!(
                id = record.id(),
                "idle pool full; closing released connection"
            );
            self.discard_quietly(&record, "idle pool full").await;
        }
    }

    pub(crate) fn reconfigure(&self, options: ConnectOptions) {
        let type_code = options.type_code();
        *self.source.lock() = Arc::new(UnpooledSource::new(self.driver.clone(), options));
        let mut state = self.state.lock();
        state.expected_type_code = type_code;
        tracing::info!(
            "pool reconfigured; existing connections will be discarded on next inspection"
        );
    }

    pub(crate) async fn force_close_all(&self) {
        let records = {
            let mut state = self.state.lock();
            let mut records = std::mem::take(&mut state.active);
            records.append(&mut state.idle);
            records
        };
        if records.is_empty() {
            return;
        }
        let count = records.len();
        for record in &records {
            self.discard_quietly(record, "force close").await;
        }
        tracing::info!(count, "forcibly closed all pooled connections");
    }

    pub(crate) async fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.force_close_all().await;
        self.available.notify_waiters();
        tracing::info!("connection pool closed");
    }

    /// Drop a record from the active list without returning it.
    ///
    /// Used when a wrapper is dropped somewhere the release task cannot run.
    pub(crate) fn untrack(&self, record: &Arc<PooledRecord>) {
        let mut state = self.state.lock();
        if let Some(pos) = state
            .active
            .iter()
            .position(|candidate| Arc::ptr_eq(candidate, record))
        {
            state.active.remove(pos);
        }
    }

    fn note_success(&self, state: &mut PoolState, record: &PooledRecord, requested_at: Instant) {
        record.mark_checked_out();
        state.stats.request_count += 1;
        state.stats.accumulated_request_time += requested_at.elapsed();
    }

    /// Invalidate a record and close its physical connection, counting it
    /// against the bad-connection total.
    async fn discard_bad(&self, record: &Arc<PooledRecord>) {
        record.invalidate();
        if let Some(mut raw) = record.take_raw().await {
            if let Err(error) = raw.close().await {
                tracing::debug!(id = record.id(), error = %error, "error closing bad connection");
            }
        }
        let mut state = self.state.lock();
        state.stats.bad_connection_count += 1;
    }

    /// Invalidate a record, roll back its uncommitted work, and close its
    /// physical connection. Not counted as a bad connection.
    async fn discard_quietly(&self, record: &Arc<PooledRecord>, reason: &'static str) {
        record.invalidate();
        let Some(mut raw) = record.take_raw().await else {
            return;
        };
        if !raw.auto_commit() {
            if let Err(error) = raw.rollback().await {
                tracing::debug!(id = record.id(), error = %error, "rollback before close failed");
            }
        }
        if let Err(error) = raw.close().await {
            tracing::debug!(id = record.id(), error = %error, reason, "error closing connection");
        } else {
            tracing::trace!(id = record.id(), reason, "closed pooled connection");
        }
    }
}

/// Builder for creating a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder()
///     .driver(driver)
///     .options(ConnectOptions::new("postgres://localhost/mydb"))
///     .max_active(20)
///     .checkout_timeout(Duration::from_secs(5))
///     .build()?;
/// ```
pub struct PoolBuilder {
    driver: Option<Arc<dyn Driver>>,
    options: Option<ConnectOptions>,
    config: PoolConfig,
}

impl PoolBuilder {
    /// Create a builder with default pool configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            driver: None,
            options: None,
            config: PoolConfig::default(),
        }
    }

    /// Set the driver new connections are opened with.
    #[must_use]
    pub fn driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the connect options.
    #[must_use]
    pub fn options(mut self, options: ConnectOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Replace the entire pool configuration.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the pool capacity.
    #[must_use]
    pub fn max_active(mut self, count: usize) -> Self {
        self.config.max_active = count;
        self
    }

    /// Set the maximum number of retained idle connections.
    #[must_use]
    pub fn max_idle(mut self, count: usize) -> Self {
        self.config.max_idle = count;
        self
    }

    /// Set the checkout timeout.
    #[must_use]
    pub fn checkout_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.checkout_timeout = timeout;
        self
    }

    /// Set the stale-active threshold.
    #[must_use]
    pub fn max_checkout_time(mut self, timeout: std::time::Duration) -> Self {
        self.config.max_checkout_time = timeout;
        self
    }

    /// Set the idle eviction age.
    #[must_use]
    pub fn idle_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.config.idle_ttl = Some(ttl);
        self
    }

    /// Enable or disable liveness probing.
    #[must_use]
    pub fn probe_enabled(mut self, enabled: bool) -> Self {
        self.config.probe_enabled = enabled;
        self
    }

    /// Set the probe statement.
    #[must_use]
    pub fn probe_statement(mut self, statement: impl Into<String>) -> Self {
        self.config.probe_statement = statement.into();
        self
    }

    /// Set the probe timeout.
    #[must_use]
    pub fn probe_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.probe_timeout = Some(timeout);
        self
    }

    /// Build the pool.
    ///
    /// Fails with [`PoolError::Config`] when the driver or options are
    /// missing or the configuration is invalid.
    pub fn build(self) -> Result<Pool> {
        let driver = self
            .driver
            .ok_or_else(|| PoolError::Config("pool builder requires a driver".to_string()))?;
        let options = self
            .options
            .ok_or_else(|| PoolError::Config("pool builder requires connect options".to_string()))?;
        Pool::new(driver, options, self.config)
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_builder_requires_driver_and_options() {
        assert!(matches!(
            PoolBuilder::new().build(),
            Err(PoolError::Config(_))
        ));
    }

    #[test]
    fn test_builder_fluent_configuration() {
        let builder = Pool::builder()
            .max_active(50)
            .max_idle(10)
            .checkout_timeout(Duration::from_secs(3))
            .probe_enabled(true)
            .probe_statement("SELECT 1");

        assert_eq!(builder.config.max_active, 50);
        assert_eq!(builder.config.max_idle, 10);
        assert_eq!(builder.config.checkout_timeout, Duration::from_secs(3));
        assert!(builder.config.probe_enabled);
        assert_eq!(builder.config.probe_statement, "SELECT 1");
    }
}
