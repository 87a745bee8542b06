//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Probe statement used when none has been configured.
///
/// Deliberately not a runnable query: enabling probing without setting a
/// statement should fail loudly against any real backing store.
pub const DEFAULT_PROBE_STATEMENT: &str = "NO PROBE QUERY SET";

/// Configuration for a connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections checked out at once (pool capacity).
    pub max_active: usize,

    /// Maximum number of idle connections retained.
    ///
    /// A connection released while the idle pool is full is closed rather
    /// than retained, even though `max_active` would allow more.
    pub max_idle: usize,

    /// How long an acquire may wait for a connection before failing.
    pub checkout_timeout: Duration,

    /// Checkout duration after which an active connection is considered
    /// abandoned and may be forcibly reclaimed.
    pub max_checkout_time: Duration,

    /// Age at which an idle connection is evicted instead of reused.
    ///
    /// `None` keeps idle connections indefinitely.
    pub idle_ttl: Option<Duration>,

    /// Whether to probe connections for liveness before returning them to
    /// the idle pool.
    pub probe_enabled: bool,

    /// Statement executed as the liveness probe.
    pub probe_statement: String,

    /// Upper bound on probe execution time.
    ///
    /// `None` uses the checkout timeout.
    pub probe_timeout: Option<Duration>,

    /// Only probe connections that have gone unused for at least this long.
    ///
    /// Zero probes on every release.
    pub probe_when_idle_for: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_active: 10,
            max_idle: 5,
            checkout_timeout: Duration::from_secs(20),
            max_checkout_time: Duration::from_secs(20),
            idle_ttl: None,
            probe_enabled: false,
            probe_statement: DEFAULT_PROBE_STATEMENT.to_string(),
            probe_timeout: None,
            probe_when_idle_for: Duration::ZERO,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool capacity.
    #[must_use]
    pub fn max_active(mut self, count: usize) -> Self {
        self.max_active = count;
        self
    }

    /// Set the maximum number of retained idle connections.
    #[must_use]
    pub fn max_idle(mut self, count: usize) -> Self {
        self.max_idle = count;
        self
    }

    /// Set the checkout timeout.
    #[must_use]
    pub fn checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = timeout;
        self
    }

    /// Set the stale-active threshold.
    #[must_use]
    pub fn max_checkout_time(mut self, timeout: Duration) -> Self {
        self.max_checkout_time = timeout;
        self
    }

    /// Set the idle eviction age.
    #[must_use]
    pub fn idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = Some(ttl);
        self
    }

    /// Enable or disable liveness probing.
    #[must_use]
    pub fn probe_enabled(mut self, enabled: bool) -> Self {
        self.probe_enabled = enabled;
        self
    }

    /// Set the probe statement.
    #[must_use]
    pub fn probe_statement(mut self, statement: impl Into<String>) -> Self {
        self.probe_statement = statement.into();
        self
    }

    /// Set the probe timeout.
    #[must_use]
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Only probe connections unused for at least this long.
    #[must_use]
    pub fn probe_when_idle_for(mut self, window: Duration) -> Self {
        self.probe_when_idle_for = window;
        self
    }

    /// The probe timeout, falling back to the checkout timeout.
    #[must_use]
    pub fn effective_probe_timeout(&self) -> Duration {
        self.probe_timeout.unwrap_or(self.checkout_timeout)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_active == 0 {
            return Err(PoolError::Config("max_active must be at least 1".to_string()));
        }
        if self.max_idle > self.max_active {
            return Err(PoolError::Config(format!(
                "max_idle ({}) exceeds max_active ({})",
                self.max_idle, self.max_active
            )));
        }
        if self.checkout_timeout.is_zero() {
            return Err(PoolError::Config(
                "checkout_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_active, 10);
        assert_eq!(config.max_idle, 5);
        assert_eq!(config.checkout_timeout, Duration::from_secs(20));
        assert!(!config.probe_enabled);
        assert_eq!(config.probe_statement, DEFAULT_PROBE_STATEMENT);
    }

    #[test]
    fn test_builder_fluent() {
        let config = PoolConfig::new()
            .max_active(20)
            .max_idle(8)
            .checkout_timeout(Duration::from_secs(5))
            .probe_enabled(true)
            .probe_statement("SELECT 1");

        assert_eq!(config.max_active, 20);
        assert_eq!(config.max_idle, 8);
        assert!(config.probe_enabled);
        assert_eq!(config.probe_statement, "SELECT 1");
    }

    #[test]
    fn test_probe_timeout_defaults_to_checkout_timeout() {
        let config = PoolConfig::new().checkout_timeout(Duration::from_secs(7));
        assert_eq!(config.effective_probe_timeout(), Duration::from_secs(7));

        let config = config.probe_timeout(Duration::from_secs(2));
        assert_eq!(config.effective_probe_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(PoolConfig::new().max_active(0).validate().is_err());
        assert!(PoolConfig::new().max_active(2).max_idle(3).validate().is_err());
        assert!(
            PoolConfig::new()
                .checkout_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(PoolConfig::new().validate().is_ok());
    }
}
