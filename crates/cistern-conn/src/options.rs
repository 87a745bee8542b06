//! Connection options.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::error::{ConnError, Result};
use crate::isolation::IsolationLevel;

/// Prefix for driver-specific entries in a properties map.
const DRIVER_PROPERTY_PREFIX: &str = "driver.";

/// Options for opening a physical connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Backing store URL.
    pub url: String,

    /// User name, if the store requires authentication.
    pub username: Option<String>,

    /// Password, if the store requires authentication.
    pub password: Option<String>,

    /// Driver-specific properties passed through verbatim.
    pub driver_properties: HashMap<String, String>,

    /// Auto-commit mode requested for fresh connections.
    ///
    /// `None` leaves the driver default untouched.
    pub auto_commit: Option<bool>,

    /// Isolation level requested for fresh connections.
    ///
    /// `None` leaves the driver default untouched.
    pub isolation: Option<IsolationLevel>,
}

impl ConnectOptions {
    /// Create options for the given URL with everything else defaulted.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Parse a connection string into options.
    ///
    /// Supports `key=value` pairs separated by semicolons:
    /// ```text
    /// url=postgres://localhost/mydb;user id=app;password=secret;driver.ssl=require;
    /// ```
    pub fn from_connection_string(conn_str: &str) -> Result<Self> {
        let mut options = Self::default();

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| ConnError::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            if let Some(name) = key.strip_prefix(DRIVER_PROPERTY_PREFIX) {
                options
                    .driver_properties
                    .insert(name.to_string(), value.to_string());
                continue;
            }

            match key.as_str() {
                "url" | "server" | "data source" => {
                    options.url = value.to_string();
                }
                "user id" | "uid" | "user" | "username" => {
                    options.username = Some(value.to_string());
                }
                "password" | "pwd" => {
                    options.password = Some(value.to_string());
                }
                "autocommit" | "auto commit" => {
                    options.auto_commit = Some(parse_bool(value));
                }
                "isolation" | "isolation level" => {
                    options.isolation = Some(IsolationLevel::from_name(value)?);
                }
                _ => {
                    // Ignore unknown options for forward compatibility
                    tracing::debug!(
                        key = key,
                        value = value,
                        "ignoring unknown connection string option"
                    );
                }
            }
        }

        if options.url.is_empty() {
            return Err(ConnError::Config(
                "connection string has no url".to_string(),
            ));
        }

        Ok(options)
    }

    /// Apply entries from a string-keyed properties map.
    ///
    /// Entries prefixed with `driver.` become driver properties; the rest use
    /// the same keys as [`ConnectOptions::from_connection_string`]. This is
    /// the surface an external configuration loader feeds.
    pub fn apply_properties(&mut self, properties: &HashMap<String, String>) -> Result<()> {
        for (key, value) in properties {
            let key = key.trim().to_lowercase();
            if let Some(name) = key.strip_prefix(DRIVER_PROPERTY_PREFIX) {
                self.driver_properties
                    .insert(name.to_string(), value.clone());
                continue;
            }
            match key.as_str() {
                "url" | "server" | "data source" => self.url = value.clone(),
                "user id" | "uid" | "user" | "username" => self.username = Some(value.clone()),
                "password" | "pwd" => self.password = Some(value.clone()),
                "autocommit" | "auto commit" => self.auto_commit = Some(parse_bool(value)),
                "isolation" | "isolation level" => {
                    self.isolation = Some(IsolationLevel::from_name(value)?);
                }
                other => {
                    return Err(ConnError::Config(format!("unknown property: {other}")));
                }
            }
        }
        Ok(())
    }

    /// Set the user name.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Request an auto-commit mode for fresh connections.
    #[must_use]
    pub fn auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = Some(auto_commit);
        self
    }

    /// Request an isolation level for fresh connections.
    #[must_use]
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    /// Add a driver-specific property.
    #[must_use]
    pub fn driver_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.driver_properties.insert(name.into(), value.into());
        self
    }

    /// The properties handed to [`crate::Driver::connect`]: driver properties
    /// plus `user` and `password` entries when credentials are set.
    #[must_use]
    pub fn effective_properties(&self) -> HashMap<String, String> {
        let mut props = self.driver_properties.clone();
        if let Some(username) = &self.username {
            props.insert("user".to_string(), username.clone());
        }
        if let Some(password) = &self.password {
            props.insert("password".to_string(), password.clone());
        }
        props
    }

    /// Fingerprint of the connection target.
    ///
    /// Derived from URL, user name, and password. Connections carry the code
    /// they were opened under so a pool can detect that it has since been
    /// pointed elsewhere.
    #[must_use]
    pub fn type_code(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.url.hash(&mut hasher);
        self.username.hash(&mut hasher);
        self.password.hash(&mut hasher);
        hasher.finish()
    }
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") || value == "1"
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_connection_string_parsing() {
        let options = ConnectOptions::from_connection_string(
            "url=postgres://localhost/test;User Id=app;Password=secret;",
        )
        .unwrap();

        assert_eq!(options.url, "postgres://localhost/test");
        assert_eq!(options.username.as_deref(), Some("app"));
        assert_eq!(options.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_connection_string_driver_properties() {
        let options = ConnectOptions::from_connection_string(
            "url=mysql://db/main;driver.ssl=require;driver.tcp_nodelay=1;",
        )
        .unwrap();

        assert_eq!(
            options.driver_properties.get("ssl").map(String::as_str),
            Some("require")
        );
        assert_eq!(
            options
                .driver_properties
                .get("tcp_nodelay")
                .map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn test_connection_string_isolation_and_autocommit() {
        let options = ConnectOptions::from_connection_string(
            "url=db://x;autocommit=true;isolation=serializable;",
        )
        .unwrap();

        assert_eq!(options.auto_commit, Some(true));
        assert_eq!(options.isolation, Some(IsolationLevel::Serializable));
    }

    #[test]
    fn test_connection_string_requires_url() {
        assert!(ConnectOptions::from_connection_string("user=app;").is_err());
    }

    #[test]
    fn test_effective_properties_include_credentials() {
        let options = ConnectOptions::new("db://x")
            .username("app")
            .password("secret")
            .driver_property("ssl", "on");

        let props = options.effective_properties();
        assert_eq!(props.get("user").map(String::as_str), Some("app"));
        assert_eq!(props.get("password").map(String::as_str), Some("secret"));
        assert_eq!(props.get("ssl").map(String::as_str), Some("on"));
    }

    #[test]
    fn test_type_code_tracks_target_identity() {
        let base = ConnectOptions::new("db://x").username("app").password("a");
        let same = ConnectOptions::new("db://x").username("app").password("a");
        let other_password = ConnectOptions::new("db://x").username("app").password("b");
        let other_url = ConnectOptions::new("db://y").username("app").password("a");

        assert_eq!(base.type_code(), same.type_code());
        assert_ne!(base.type_code(), other_password.type_code());
        assert_ne!(base.type_code(), other_url.type_code());
    }

    #[test]
    fn test_type_code_ignores_driver_properties() {
        let plain = ConnectOptions::new("db://x").username("app");
        let with_props = ConnectOptions::new("db://x")
            .username("app")
            .driver_property("ssl", "on");

        assert_eq!(plain.type_code(), with_props.type_code());
    }

    #[test]
    fn test_apply_properties_rejects_unknown_keys() {
        let mut options = ConnectOptions::new("db://x");
        let mut props = HashMap::new();
        props.insert("bogus".to_string(), "1".to_string());
        assert!(options.apply_properties(&props).is_err());
    }

    proptest! {
        #[test]
        fn prop_connection_string_roundtrip(
            url in "[a-z]{2,8}://[a-z0-9.]{1,16}/[a-z0-9]{1,12}",
            user in "[a-zA-Z0-9]{1,12}",
            password in "[a-zA-Z0-9]{1,12}",
        ) {
            let conn_str = format!("url={url};user={user};password={password};");
            let parsed = ConnectOptions::from_connection_string(&conn_str).unwrap();
            let built = ConnectOptions::new(url.clone())
                .username(user.clone())
                .password(password.clone());

            prop_assert_eq!(&parsed.url, &url);
            prop_assert_eq!(parsed.username.as_deref(), Some(user.as_str()));
            prop_assert_eq!(parsed.password.as_deref(), Some(password.as_str()));
            prop_assert_eq!(parsed.type_code(), built.type_code());
        }
    }
}
