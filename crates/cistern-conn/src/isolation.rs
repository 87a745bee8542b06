//! Transaction isolation levels.

/// Transaction isolation level applied to a fresh connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// No isolation guarantees.
    None,
    /// Read uncommitted (dirty reads allowed).
    ReadUncommitted,
    /// Read committed (the common default).
    #[default]
    ReadCommitted,
    /// Repeatable read.
    RepeatableRead,
    /// Serializable (highest isolation).
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL statement to set this isolation level, or `None` for
    /// [`IsolationLevel::None`].
    #[must_use]
    pub fn as_sql(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::ReadUncommitted => Some("SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED"),
            Self::ReadCommitted => Some("SET TRANSACTION ISOLATION LEVEL READ COMMITTED"),
            Self::RepeatableRead => Some("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ"),
            Self::Serializable => Some("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"),
        }
    }

    /// Parse a level from its configuration name.
    pub fn from_name(name: &str) -> Result<Self, crate::error::ConnError> {
        match name.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "none" => Ok(Self::None),
            "read uncommitted" => Ok(Self::ReadUncommitted),
            "read committed" => Ok(Self::ReadCommitted),
            "repeatable read" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            other => Err(crate::error::ConnError::Config(format!(
                "unknown isolation level: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_accepts_separators() {
        assert_eq!(
            IsolationLevel::from_name("read-committed").ok(),
            Some(IsolationLevel::ReadCommitted)
        );
        assert_eq!(
            IsolationLevel::from_name("REPEATABLE_READ").ok(),
            Some(IsolationLevel::RepeatableRead)
        );
    }

    #[test]
    fn test_none_has_no_sql() {
        assert!(IsolationLevel::None.as_sql().is_none());
        assert!(IsolationLevel::Serializable.as_sql().is_some());
    }
}
