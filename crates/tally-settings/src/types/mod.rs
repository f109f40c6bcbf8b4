//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`], so a settings file only needs the fields it overrides.

mod database;

pub use database::*;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "database": { "driver": "postgres", "connectionDetails": { "host": "db" } },
///   "migrations": { "dir": "migrations" },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TallySettings {
    /// Backend selection and connection details.
    pub database: DatabaseConfig,
    /// Where migration scripts live.
    pub migrations: MigrationSettings,
    /// Log output configuration.
    pub logging: LoggingSettings,
}

impl TallySettings {
    /// Validate every section that can be checked without I/O.
    pub fn validate(&self) -> Result<()> {
        self.database.validate()?;
        if self.migrations.dir.as_os_str().is_empty() {
            return Err(SettingsError::InvalidValue(
                "migrations.dir must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Migration discovery settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MigrationSettings {
    /// Directory scanned for `<version>_<name>[.<driver>].sql` files.
    pub dir: PathBuf,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("migrations"),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive, e.g. `info` or `tally_store=debug,info`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
