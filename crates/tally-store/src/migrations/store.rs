//! Migration discovery.
//!
//! A migration directory holds one `.sql` file per schema change, named
//! `<version>_<name>[.<driver>].sql`:
//!
//! - `0001_create_audit_table.sqlite.sql` runs only on `SQLite`
//! - `0001_create_audit_table.postgres.sql` runs only on Postgres
//! - `0002_add_audit_index.sql` runs on every driver
//!
//! Underscores in `<name>` become spaces in the recorded description. Dots
//! are reserved for the driver suffix. Hidden files, sub-directories and
//! files without a `.sql` extension are ignored.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use tally_settings::Driver;
use tracing::debug;

use crate::errors::{LoadError, Result};

/// A single versioned schema change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Migration {
    /// Ordering key; unique within a store.
    pub version: u32,
    /// Human-readable description, recorded in the ledger.
    pub name: String,
    /// Statement block executed inside the migration's transaction.
    pub sql: String,
    /// File the migration was read from.
    pub path: PathBuf,
}

/// Migrations for one driver, sorted by ascending version.
#[derive(Clone, Debug)]
pub struct MigrationStore {
    driver: Driver,
    migrations: Vec<Migration>,
}

impl MigrationStore {
    /// Read every migration in `dir` that applies to `driver`.
    ///
    /// All validation (names, duplicates, readability) happens here, before
    /// anything touches a database.
    pub fn load(dir: impl AsRef<Path>, driver: Driver) -> Result<Self> {
        let dir = dir.as_ref();
        let unreadable = |source| LoadError::Unreadable {
            path: dir.to_path_buf(),
            source,
        };

        let mut migrations = Vec::new();
        for entry in fs::read_dir(dir).map_err(unreadable)? {
            let path = entry.map_err(unreadable)?.path();
            if !path.is_file() {
                debug!(path = %path.display(), "skipping non-file entry");
                continue;
            }
            let Some(file_name) = path.file_name().and_then(OsStr::to_str) else {
                return Err(LoadError::Malformed {
                    path,
                    reason: "file name is not valid UTF-8".into(),
                }
                .into());
            };
            let Some(parsed) = parse_file_name(file_name).map_err(|reason| {
                LoadError::Malformed {
                    path: path.clone(),
                    reason,
                }
            })?
            else {
                debug!(path = %path.display(), "ignoring non-migration file");
                continue;
            };
            if parsed.driver.is_some_and(|d| d != driver) {
                debug!(path = %path.display(), %driver, "migration targets another driver");
                continue;
            }

            let sql = fs::read_to_string(&path).map_err(|source| LoadError::Unreadable {
                path: path.clone(),
                source,
            })?;
            if sql.trim().is_empty() {
                return Err(LoadError::Malformed {
                    path,
                    reason: "script is empty".into(),
                }
                .into());
            }

            migrations.push(Migration {
                version: parsed.version,
                name: parsed.name,
                sql,
                path,
            });
        }

        let store = Self::from_migrations(driver, migrations)?;
        debug!(dir = %dir.display(), %driver, count = store.len(), "migrations loaded");
        Ok(store)
    }

    /// Build a store from already-materialized migrations.
    ///
    /// Sorts by version and rejects duplicates and version 0.
    pub fn from_migrations(driver: Driver, mut migrations: Vec<Migration>) -> Result<Self> {
        migrations.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.path.cmp(&b.path)));

        if let Some(zero) = migrations.iter().find(|m| m.version == 0) {
            return Err(LoadError::Malformed {
                path: zero.path.clone(),
                reason: "version must be at least 1".into(),
            }
            .into());
        }
        if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(LoadError::DuplicateVersion {
                version: pair[0].version,
                first: pair[0].path.clone(),
                second: pair[1].path.clone(),
            }
            .into());
        }

        Ok(Self { driver, migrations })
    }

    /// Driver the store was loaded for.
    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// Migrations in ascending version order.
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Look up a migration by version.
    pub fn get(&self, version: u32) -> Option<&Migration> {
        self.migrations
            .binary_search_by_key(&version, |m| m.version)
            .ok()
            .map(|i| &self.migrations[i])
    }

    /// Highest version in the store, or 0 when empty.
    pub fn latest_version(&self) -> u32 {
        self.migrations.last().map_or(0, |m| m.version)
    }

    /// Number of migrations.
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether the store has no migrations.
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// Pieces of a migration file name.
#[derive(Debug, PartialEq, Eq)]
struct ParsedName {
    version: u32,
    name: String,
    driver: Option<Driver>,
}

/// `Ok(None)` for files that are not migrations at all.
fn parse_file_name(file_name: &str) -> std::result::Result<Option<ParsedName>, String> {
    if file_name.starts_with('.') {
        return Ok(None);
    }
    let Some(stem) = file_name.strip_suffix(".sql") else {
        return Ok(None);
    };

    let (base, driver) = match stem.rsplit_once('.') {
        Some((base, suffix)) => {
            let driver = suffix
                .parse::<Driver>()
                .map_err(|_| format!("unknown driver suffix {suffix:?}"))?;
            (base, Some(driver))
        }
        None => (stem, None),
    };

    let (digits, name) = base
        .split_once('_')
        .ok_or_else(|| "expected <version>_<name>.sql".to_string())?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("version prefix {digits:?} is not a number"));
    }
    let version: u32 = digits
        .parse()
        .map_err(|_| format!("version prefix {digits} is out of range"))?;
    let name = name.replace('_', " ").trim().to_string();
    if name.is_empty() {
        return Err("migration name is empty".into());
    }

    Ok(Some(ParsedName {
        version,
        name,
        driver,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
