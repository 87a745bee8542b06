//! Connection liveness probing.

use std::time::Duration;

use crate::config::PoolConfig;
use crate::conn::PooledRecord;

/// Issues lightweight liveness probes against physical connections.
///
/// Probing never fails: any probe error or timeout is logged and reported as
/// "not valid". Probes run outside the pool lock; only the probed record's
/// own connection mutex is held.
pub(crate) struct Prober {
    enabled: bool,
    statement: String,
    timeout: Duration,
    when_idle_for: Duration,
}

impl Prober {
    pub(crate) fn from_config(config: &PoolConfig) -> Self {
        Self {
            enabled: config.probe_enabled,
            statement: config.probe_statement.clone(),
            timeout: config.effective_probe_timeout(),
            when_idle_for: config.probe_when_idle_for,
        }
    }

    /// Whether the record's physical connection is usable.
    ///
    /// With probing disabled this is just the validity flag plus presence of
    /// the physical connection. With probing enabled, the probe statement is
    /// executed with a bounded timeout, but only when the connection has
    /// gone unused for at least the configured window.
    pub(crate) async fn is_valid(&self, record: &PooledRecord) -> bool {
        if !record.is_valid_flag() {
            return false;
        }

        let mut guard = record.raw.lock().await;
        let Some(conn) = guard.as_mut() else {
            return false;
        };

        if !self.enabled {
            return true;
        }
        if conn.is_closed() {
            return false;
        }
        if record.idle_time() < self.when_idle_for {
            return true;
        }

        match tokio::time::timeout(self.timeout, conn.execute(&self.statement)).await {
            Ok(Ok(_)) => {
                tracing::trace!(id = record.id(), "connection probe succeeded");
                true
            }
            Ok(Err(error)) => {
                tracing::warn!(id = record.id(), error = %error, "connection probe failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    id = record.id(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "connection probe timed out"
                );
                false
            }
        }
    }
}
