//! Schema migration runner.
//!
//! Migrations are read from a directory by [`MigrationStore::load`] and
//! applied in version order by [`run_migrations`]. Each migration runs inside
//! its own transaction together with its ledger row, so a failure rolls back
//! cleanly and leaves every earlier migration committed.
//!
//! The `schema_version` table tracks which versions have been applied.
//! Membership is by version, not by maximum: a gap left by an out-of-order
//! file added later is still filled on the next run.

mod ledger;
mod store;

use std::collections::BTreeSet;

use tally_settings::SettingsError;
use tracing::{debug, info};

pub use self::store::{Migration, MigrationStore};

use self::ledger::{Ledger, PostgresLedger, SqliteLedger};
use crate::connection::{Backend, Database};
use crate::errors::Result;

/// Outcome of a [`run_migrations`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Versions executed by this run, ascending.
    pub applied: Vec<u32>,
    /// Versions found already recorded in the ledger.
    pub skipped: Vec<u32>,
}

impl MigrationReport {
    /// Whether this run changed the schema.
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Apply every migration in `store` that the ledger does not yet record.
///
/// Creates `schema_version` on first use and checks its columns before
/// reading it. Stops at the first failing migration.
pub fn run_migrations(db: &Database, store: &MigrationStore) -> Result<MigrationReport> {
    if store.driver() != db.driver() {
        return Err(SettingsError::InvalidValue(format!(
            "migrations loaded for {} cannot run against a {} database",
            store.driver(),
            db.driver()
        ))
        .into());
    }

    with_ledger(db, |ledger| {
        let applied = ledger.applied_versions()?;
        let mut report = MigrationReport::default();

        for migration in store.migrations() {
            if applied.contains(&migration.version) {
                debug!(
                    version = migration.version,
                    name = %migration.name,
                    "migration already applied, skipping"
                );
                report.skipped.push(migration.version);
                continue;
            }

            info!(
                version = migration.version,
                name = %migration.name,
                "applying migration"
            );
            ledger.apply(migration)?;
            report.applied.push(migration.version);
        }

        if report.changed() {
            info!(applied = report.applied.len(), "migrations complete");
        }
        Ok(report)
    })
}

/// Versions recorded in the ledger.
pub fn applied_versions(db: &Database) -> Result<BTreeSet<u32>> {
    with_ledger(db, |ledger| ledger.applied_versions())
}

/// Highest applied version, or 0 if none.
pub fn current_version(db: &Database) -> Result<u32> {
    Ok(applied_versions(db)?.last().copied().unwrap_or(0))
}

/// Migrations in `store` not yet recorded in the ledger.
pub fn pending<'a>(db: &Database, store: &'a MigrationStore) -> Result<Vec<&'a Migration>> {
    let applied = applied_versions(db)?;
    Ok(store
        .migrations()
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .collect())
}

/// Check out a connection, prepare the ledger, and hand it to `f`.
fn with_ledger<T>(db: &Database, f: impl FnOnce(&mut dyn Ledger) -> Result<T>) -> Result<T> {
    match db.backend() {
        Backend::Sqlite(pool) => {
            let conn = pool.get()?;
            let mut ledger = SqliteLedger::new(&conn);
            prepare(&mut ledger)?;
            f(&mut ledger)
        }
        Backend::Postgres(pool) => {
            let mut client = pool.get()?;
            let mut ledger = PostgresLedger::new(&mut client);
            prepare(&mut ledger)?;
            f(&mut ledger)
        }
    }
}

fn prepare(ledger: &mut dyn Ledger) -> Result<()> {
    ledger.ensure_table()?;
    ledger.verify_columns()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use assert_matches::assert_matches;
    use tally_settings::{DatabaseConfig, Driver, SQLITE_MEMORY};

    use super::*;
    use crate::errors::StoreError;

    fn memory_db() -> Database {
        Database::connect(&DatabaseConfig::sqlite(SQLITE_MEMORY)).unwrap()
    }

    fn step(version: u32, sql: &str) -> Migration {
        Migration {
            version,
            name: format!("step {version}"),
            sql: sql.into(),
            path: PathBuf::from(format!("{version}_step.sql")),
        }
    }

    fn store(migrations: Vec<Migration>) -> MigrationStore {
        MigrationStore::from_migrations(Driver::Sqlite, migrations).unwrap()
    }

    #[test]
    fn fresh_database_starts_at_zero() {
        let db = memory_db();
        assert_eq!(current_version(&db).unwrap(), 0);
        assert!(applied_versions(&db).unwrap().is_empty());
    }

    #[test]
    fn run_applies_in_order_and_is_idempotent() {
        let db = memory_db();
        let store = store(vec![
            step(2, "ALTER TABLE t ADD COLUMN name TEXT;"),
            step(1, "CREATE TABLE t (id INTEGER PRIMARY KEY);"),
        ]);

        let first = run_migrations(&db, &store).unwrap();
        assert_eq!(first.applied, vec![1, 2]);
        assert!(first.skipped.is_empty());
        assert_eq!(current_version(&db).unwrap(), 2);

        let second = run_migrations(&db, &store).unwrap();
        assert!(!second.changed());
        assert_eq!(second.skipped, vec![1, 2]);
    }

    #[test]
    fn failure_stops_run_and_keeps_earlier_versions() {
        let db = memory_db();
        let store = store(vec![
            step(1, "CREATE TABLE a (id INTEGER);"),
            step(2, "CREATE TABLE b (id INTEGER); INSERT INTO nowhere VALUES (1);"),
            step(3, "CREATE TABLE c (id INTEGER);"),
        ]);

        let err = run_migrations(&db, &store).unwrap_err();
        assert_matches!(err, StoreError::Migration { version: 2, .. });
        assert_eq!(applied_versions(&db).unwrap(), BTreeSet::from([1]));

        let remaining: Vec<u32> = pending(&db, &store).unwrap().iter().map(|m| m.version).collect();
        assert_eq!(remaining, vec![2, 3]);
    }

    #[test]
    fn gap_in_ledger_is_filled() {
        let db = memory_db();
        let _ = run_migrations(&db, &store(vec![step(2, "CREATE TABLE b (id INTEGER);")])).unwrap();

        let report = run_migrations(
            &db,
            &store(vec![
                step(1, "CREATE TABLE a (id INTEGER);"),
                step(2, "CREATE TABLE b (id INTEGER);"),
            ]),
        )
        .unwrap();
        assert_eq!(report.applied, vec![1]);
        assert_eq!(report.skipped, vec![2]);
    }

    #[test]
    fn empty_store_only_creates_ledger() {
        let db = memory_db();
        let report = run_migrations(&db, &store(Vec::new())).unwrap();
        assert_eq!(report, MigrationReport::default());

        let conn = db.sqlite_pool().unwrap().get().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn driver_mismatch_is_rejected() {
        let db = memory_db();
        let postgres = MigrationStore::from_migrations(Driver::Postgres, Vec::new()).unwrap();
        assert_matches!(run_migrations(&db, &postgres), Err(StoreError::Config(_)));
    }

    #[test]
    fn drifted_ledger_blocks_run() {
        let db = memory_db();
        {
            let conn = db.sqlite_pool().unwrap().get().unwrap();
            conn.execute_batch("CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TEXT);")
                .unwrap();
        }
        let err = run_migrations(&db, &store(vec![step(1, "CREATE TABLE a (id INTEGER);")]))
            .unwrap_err();
        assert_matches!(err, StoreError::LedgerSchema { missing } if missing == ["description"]);
    }
}
