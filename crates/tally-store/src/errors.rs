//! Error types for the connection layer and migration runner.
//!
//! The variants map onto the failure classes callers act on:
//! configuration ([`StoreError::Config`]), reachability
//! ([`StoreError::Connection`]), migration discovery ([`LoadError`]),
//! ledger drift ([`StoreError::LedgerSchema`]) and script execution
//! ([`StoreError::Migration`]). None of them are retried internally.

use std::path::PathBuf;

use tally_settings::{Driver, SettingsError};
use thiserror::Error;

/// Errors returned by the store crate.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database config cannot open anything.
    #[error("invalid database config: {0}")]
    Config(#[from] SettingsError),

    /// The backend is unreachable or rejected the connection.
    #[error("cannot connect to {driver} database: {message}")]
    Connection {
        /// Backend that failed.
        driver: Driver,
        /// Underlying failure.
        message: String,
    },

    /// Migration discovery failed; nothing was executed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// `schema_version` exists but lacks columns the runner relies on.
    #[error("ledger table schema_version is missing columns: {}", missing.join(", "))]
    LedgerSchema {
        /// Expected column names that were not found.
        missing: Vec<String>,
    },

    /// A migration script failed and its transaction was rolled back.
    #[error("migration v{version} ({name}) failed: {message}")]
    Migration {
        /// Version of the failing migration.
        version: u32,
        /// Its human-readable name.
        name: String,
        /// Backend error text.
        message: String,
    },

    /// `SQLite` error outside a migration script.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Postgres error outside a migration script.
    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    /// Connection pool checkout failed.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

/// Reasons the migration directory could not be turned into a store.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Directory or file could not be read.
    #[error("cannot read migration source {}: {source}", path.display())]
    Unreadable {
        /// Path that failed.
        path: PathBuf,
        /// I/O failure.
        source: std::io::Error,
    },

    /// File name or content does not describe a migration.
    #[error("malformed migration {}: {reason}", path.display())]
    Malformed {
        /// Offending file.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// Two files resolve to the same version for the active driver.
    #[error(
        "duplicate migration version {version}: {} and {}",
        first.display(),
        second.display()
    )]
    DuplicateVersion {
        /// Shared version.
        version: u32,
        /// File seen first.
        first: PathBuf,
        /// File seen second.
        second: PathBuf,
    },
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_error_names_version() {
        let err = StoreError::Migration {
            version: 3,
            name: "add index".into(),
            message: "no such table: audit_event".into(),
        };
        assert_eq!(
            err.to_string(),
            "migration v3 (add index) failed: no such table: audit_event"
        );
    }

    #[test]
    fn duplicate_version_display() {
        let err = LoadError::DuplicateVersion {
            version: 2,
            first: PathBuf::from("m/0002_a.sql"),
            second: PathBuf::from("m/2_b.sql"),
        };
        assert_eq!(
            err.to_string(),
            "duplicate migration version 2: m/0002_a.sql and m/2_b.sql"
        );
    }

    #[test]
    fn load_error_is_transparent() {
        let err: StoreError = LoadError::Malformed {
            path: PathBuf::from("x.sql"),
            reason: "missing version prefix".into(),
        }
        .into();
        assert_eq!(err.to_string(), "malformed migration x.sql: missing version prefix");
    }

    #[test]
    fn ledger_schema_lists_columns() {
        let err = StoreError::LedgerSchema {
            missing: vec!["applied_at".into(), "description".into()],
        };
        assert!(err.to_string().ends_with("applied_at, description"));
    }

    #[test]
    fn connection_error_names_driver() {
        let err = StoreError::Connection {
            driver: Driver::Postgres,
            message: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot connect to postgres database: connection refused"
        );
    }

    #[test]
    fn from_rusqlite_error() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }
}
