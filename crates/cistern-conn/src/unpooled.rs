//! Unpooled connection source.
//!
//! Opens one fresh physical connection per call. The pool layers on top of
//! this; callers that want a connection per unit of work can use it directly.

use std::sync::Arc;

use crate::connection::{Connection, Driver};
use crate::error::Result;
use crate::options::ConnectOptions;

/// A connection source that opens a brand-new physical connection on every
/// call.
///
/// The driver is injected at construction; the source owns no shared state
/// beyond it, so concurrent `connect` calls are independent.
pub struct UnpooledSource {
    driver: Arc<dyn Driver>,
    options: ConnectOptions,
}

impl UnpooledSource {
    /// Create a source from a driver and connect options.
    pub fn new(driver: Arc<dyn Driver>, options: ConnectOptions) -> Self {
        Self { driver, options }
    }

    /// The options fresh connections are opened with.
    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Replace the connect options.
    ///
    /// Only affects connections opened after the call.
    pub fn set_options(&mut self, options: ConnectOptions) {
        self.options = options;
    }

    /// Open and configure a fresh connection.
    pub async fn connect(&self) -> Result<Box<dyn Connection>> {
        let properties = self.options.effective_properties();
        self.open(&properties).await
    }

    /// Open and configure a fresh connection with explicit credentials,
    /// overriding the configured ones.
    pub async fn connect_with_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn Connection>> {
        let mut properties = self.options.effective_properties();
        properties.insert("user".to_string(), username.to_string());
        properties.insert("password".to_string(), password.to_string());
        self.open(&properties).await
    }

    async fn open(
        &self,
        properties: &std::collections::HashMap<String, String>,
    ) -> Result<Box<dyn Connection>> {
        tracing::debug!(url = %self.options.url, "opening connection");
        let mut conn = self.driver.connect(&self.options.url, properties).await?;
        self.configure(conn.as_mut()).await?;
        Ok(conn)
    }

    /// Apply the requested auto-commit mode and isolation level.
    async fn configure(&self, conn: &mut dyn Connection) -> Result<()> {
        if let Some(auto_commit) = self.options.auto_commit {
            if auto_commit != conn.auto_commit() {
                conn.set_auto_commit(auto_commit).await?;
            }
        }
        if let Some(level) = self.options.isolation {
            conn.set_isolation(level).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::ConnError;
    use crate::isolation::IsolationLevel;

    #[derive(Default)]
    struct RecordingConnection {
        auto_commit: bool,
        isolation: Option<IsolationLevel>,
        closed: bool,
    }

    #[async_trait]
    impl Connection for RecordingConnection {
        async fn execute(&mut self, _sql: &str) -> Result<u64> {
            Ok(0)
        }

        async fn commit(&mut self) -> Result<()> {
            Ok(())
        }

        async fn rollback(&mut self) -> Result<()> {
            Ok(())
        }

        fn auto_commit(&self) -> bool {
            self.auto_commit
        }

        async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
            self.auto_commit = auto_commit;
            Ok(())
        }

        async fn set_isolation(&mut self, level: IsolationLevel) -> Result<()> {
            self.isolation = Some(level);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    struct RecordingDriver {
        seen_properties: Mutex<Vec<HashMap<String, String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Driver for RecordingDriver {
        async fn connect(
            &self,
            _url: &str,
            properties: &HashMap<String, String>,
        ) -> Result<Box<dyn Connection>> {
            if self.fail {
                return Err(ConnError::Driver("refused".to_string()));
            }
            self.seen_properties.lock().unwrap().push(properties.clone());
            Ok(Box::new(RecordingConnection::default()))
        }
    }

    fn driver(fail: bool) -> Arc<RecordingDriver> {
        Arc::new(RecordingDriver {
            seen_properties: Mutex::new(Vec::new()),
            fail,
        })
    }

    #[tokio::test]
    async fn test_connect_passes_credentials_as_properties() {
        let driver = driver(false);
        let options = ConnectOptions::new("db://x").username("app").password("pw");
        let source = UnpooledSource::new(driver.clone(), options);

        source.connect().await.unwrap();

        let seen = driver.seen_properties.lock().unwrap();
        assert_eq!(seen[0].get("user").map(String::as_str), Some("app"));
        assert_eq!(seen[0].get("password").map(String::as_str), Some("pw"));
    }

    #[tokio::test]
    async fn test_connect_applies_auto_commit_and_isolation() {
        let driver = driver(false);
        let options = ConnectOptions::new("db://x")
            .auto_commit(true)
            .isolation(IsolationLevel::Serializable);
        let source = UnpooledSource::new(driver, options);

        let conn = source.connect().await.unwrap();
        assert!(conn.auto_commit());
    }

    #[tokio::test]
    async fn test_connect_with_credentials_overrides_configured() {
        let driver = driver(false);
        let options = ConnectOptions::new("db://x").username("app").password("pw");
        let source = UnpooledSource::new(driver.clone(), options);

        source.connect_with_credentials("other", "secret").await.unwrap();

        let seen = driver.seen_properties.lock().unwrap();
        assert_eq!(seen[0].get("user").map(String::as_str), Some("other"));
        assert_eq!(seen[0].get("password").map(String::as_str), Some("secret"));
    }

    #[tokio::test]
    async fn test_connect_propagates_driver_error() {
        let source = UnpooledSource::new(driver(true), ConnectOptions::new("db://x"));
        assert!(source.connect().await.is_err());
    }
}
