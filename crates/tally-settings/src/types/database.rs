//! Database driver and connection settings.

use std::fmt;
use std::str::FromStr;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{Result, SettingsError};

/// Path value that selects a private in-memory `SQLite` database.
pub const SQLITE_MEMORY: &str = ":memory:";

/// Supported database backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// Embedded file-based `SQLite`.
    #[default]
    #[serde(alias = "sqlite3")]
    Sqlite,
    /// Networked `PostgreSQL`.
    #[serde(alias = "postgresql", alias = "psql")]
    Postgres,
}

impl Driver {
    /// Canonical lowercase name, also used as the migration file suffix.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }

    /// Every supported driver.
    pub fn all() -> [Driver; 2] {
        [Self::Sqlite, Self::Postgres]
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Driver {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "psql" => Ok(Self::Postgres),
            other => Err(SettingsError::InvalidValue(format!(
                "unknown database driver: {other}"
            ))),
        }
    }
}

/// TLS negotiation mode for networked backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    /// Never use TLS.
    #[default]
    Disable,
    /// Use TLS if the server offers it.
    Prefer,
    /// Refuse to connect without TLS.
    Require,
}

impl FromStr for SslMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "disable" => Ok(Self::Disable),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            other => Err(SettingsError::InvalidValue(format!("unknown ssl mode: {other}"))),
        }
    }
}

/// Backend-specific connection fields.
///
/// For `SQLite`, `database` is a file path (or [`SQLITE_MEMORY`]) and the
/// network fields are ignored. For Postgres, `database` is the database name.
/// The password is never serialized and is redacted in `Debug` output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionDetails {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login role.
    pub username: String,
    /// Login password.
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,
    /// Database name, or file path for `SQLite`.
    pub database: String,
    /// TLS mode.
    pub ssl_mode: SslMode,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection (and for the initial connect).
    pub connect_timeout_secs: u64,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for ConnectionDetails {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: String::new(),
            password: None,
            database: "tally.db".to_string(),
            ssl_mode: SslMode::Disable,
            max_connections: 16,
            connect_timeout_secs: 30,
            busy_timeout_ms: 30_000,
        }
    }
}

impl ConnectionDetails {
    /// Details for a `SQLite` database at `path`, all other fields defaulted.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            database: path.into(),
            ..Self::default()
        }
    }

    /// Whether this names an in-memory `SQLite` database.
    pub fn is_memory(&self) -> bool {
        self.database == SQLITE_MEMORY
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()).map(SecretString::from))
}

/// Driver selection plus its connection details.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseConfig {
    /// Which backend to open.
    pub driver: Driver,
    /// How to reach it.
    pub connection_details: ConnectionDetails,
}

impl DatabaseConfig {
    /// Config for a `SQLite` database at `path`.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            driver: Driver::Sqlite,
            connection_details: ConnectionDetails::sqlite(path),
        }
    }

    /// Reject configurations that cannot possibly open.
    pub fn validate(&self) -> Result<()> {
        let details = &self.connection_details;
        if details.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "maxConnections must be at least 1".into(),
            ));
        }
        if details.connect_timeout_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "connectTimeoutSecs must be at least 1".into(),
            ));
        }
        if details.database.trim().is_empty() {
            return Err(SettingsError::InvalidValue(format!(
                "{} requires a database {}",
                self.driver,
                match self.driver {
                    Driver::Sqlite => "path",
                    Driver::Postgres => "name",
                }
            )));
        }
        if self.driver == Driver::Postgres {
            if details.host.trim().is_empty() {
                return Err(SettingsError::InvalidValue("postgres requires a host".into()));
            }
            if details.username.trim().is_empty() {
                return Err(SettingsError::InvalidValue(
                    "postgres requires a username".into(),
                ));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use secrecy::ExposeSecret;

    #[test]
    fn driver_parses_aliases() {
        assert_eq!("sqlite3".parse::<Driver>().unwrap(), Driver::Sqlite);
        assert_eq!("PostgreSQL".parse::<Driver>().unwrap(), Driver::Postgres);
        assert_eq!(" psql ".parse::<Driver>().unwrap(), Driver::Postgres);
    }

    #[test]
    fn driver_rejects_unknown_name() {
        let err = "mysql".parse::<Driver>().unwrap_err();
        assert_matches!(err, SettingsError::InvalidValue(msg) if msg.contains("mysql"));
    }

    #[test]
    fn driver_serde_uses_lowercase_and_aliases() {
        assert_eq!(serde_json::to_string(&Driver::Postgres).unwrap(), "\"postgres\"");
        let parsed: Driver = serde_json::from_str("\"sqlite3\"").unwrap();
        assert_eq!(parsed, Driver::Sqlite);
        assert!(serde_json::from_str::<Driver>("\"oracle\"").is_err());
    }

    #[test]
    fn password_is_read_but_never_written() {
        let details: ConnectionDetails =
            serde_json::from_str(r#"{"username":"gct","password":"hunter2"}"#).unwrap();
        assert_eq!(
            details.password.as_ref().map(|p| p.expose_secret().to_string()),
            Some("hunter2".to_string())
        );

        let json = serde_json::to_string(&details).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!format!("{details:?}").contains("hunter2"));
    }

    #[test]
    fn empty_password_is_none() {
        let details: ConnectionDetails = serde_json::from_str(r#"{"password":""}"#).unwrap();
        assert!(details.password.is_none());
    }

    #[test]
    fn sqlite_config_validates() {
        assert!(DatabaseConfig::sqlite("/tmp/x.db").validate().is_ok());
        assert!(DatabaseConfig::sqlite(SQLITE_MEMORY).validate().is_ok());
    }

    #[test]
    fn sqlite_requires_path() {
        let err = DatabaseConfig::sqlite("  ").validate().unwrap_err();
        assert!(err.to_string().contains("database path"));
    }

    #[test]
    fn postgres_requires_host_and_user() {
        let mut config = DatabaseConfig {
            driver: Driver::Postgres,
            connection_details: ConnectionDetails {
                database: "tally".into(),
                ..ConnectionDetails::default()
            },
        };
        assert!(config.validate().unwrap_err().to_string().contains("username"));

        config.connection_details.username = "tally".into();
        config.connection_details.host = String::new();
        assert!(config.validate().unwrap_err().to_string().contains("host"));

        config.connection_details.host = "db.internal".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_pool_size_rejected() {
        let mut config = DatabaseConfig::sqlite("/tmp/x.db");
        config.connection_details.max_connections = 0;
        assert!(config.validate().unwrap_err().to_string().contains("maxConnections"));
    }

    #[test]
    fn zero_connect_timeout_rejected() {
        let mut config = DatabaseConfig::sqlite("/tmp/x.db");
        config.connection_details.connect_timeout_secs = 0;
        assert!(config.validate().unwrap_err().to_string().contains("connectTimeoutSecs"));
    }

    #[test]
    fn memory_detection() {
        assert!(ConnectionDetails::sqlite(SQLITE_MEMORY).is_memory());
        assert!(!ConnectionDetails::sqlite("tally.db").is_memory());
    }
}
