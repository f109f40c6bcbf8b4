//! The `schema_version` ledger, one implementation per backend.

use std::collections::BTreeSet;

use rusqlite::{Connection, params};
use tracing::warn;

use super::store::Migration;
use crate::errors::{Result, StoreError};

/// Columns the runner reads and writes.
pub(crate) const LEDGER_COLUMNS: [&str; 3] = ["version", "description", "applied_at"];

/// Backend operations the runner needs.
pub(crate) trait Ledger {
    /// Create `schema_version` if it does not exist.
    fn ensure_table(&mut self) -> Result<()>;

    /// Column names of the existing `schema_version` table.
    fn columns(&mut self) -> Result<Vec<String>>;

    /// Raw version values recorded in the ledger.
    fn recorded_versions(&mut self) -> Result<Vec<i64>>;

    /// Execute `migration` and record it, atomically.
    fn apply(&mut self, migration: &Migration) -> Result<()>;

    /// Fail with [`StoreError::LedgerSchema`] when expected columns are absent.
    fn verify_columns(&mut self) -> Result<()> {
        let present = self.columns()?;
        let missing: Vec<String> = LEDGER_COLUMNS
            .iter()
            .filter(|expected| !present.iter().any(|c| c.eq_ignore_ascii_case(expected)))
            .map(|c| (*c).to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::LedgerSchema { missing })
        }
    }

    /// Versions already applied.
    fn applied_versions(&mut self) -> Result<BTreeSet<u32>> {
        let mut applied = BTreeSet::new();
        for raw in self.recorded_versions()? {
            match u32::try_from(raw) {
                Ok(version) => {
                    let _ = applied.insert(version);
                }
                Err(_) => warn!(version = raw, "ignoring out-of-range ledger entry"),
            }
        }
        Ok(applied)
    }
}

fn migration_error(migration: &Migration, message: impl ToString) -> StoreError {
    StoreError::Migration {
        version: migration.version,
        name: migration.name.clone(),
        message: message.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct SqliteLedger<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteLedger<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl Ledger for SqliteLedger<'_> {
    fn ensure_table(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version     INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at  TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn columns(&mut self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("PRAGMA table_info(schema_version)")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn recorded_versions(&mut self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare("SELECT version FROM schema_version")?;
        let versions = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    fn apply(&mut self, migration: &Migration) -> Result<()> {
        // Dropping the transaction without commit rolls it back.
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| migration_error(migration, e))?;
        tx.execute_batch(&migration.sql)
            .map_err(|e| migration_error(migration, e))?;
        let _ = tx
            .execute(
                "INSERT INTO schema_version (version, description, applied_at)
                 VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                params![migration.version, migration.name],
            )
            .map_err(|e| migration_error(migration, e))?;
        tx.commit().map_err(|e| migration_error(migration, e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Postgres
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct PostgresLedger<'a> {
    client: &'a mut postgres::Client,
}

impl<'a> PostgresLedger<'a> {
    pub(crate) fn new(client: &'a mut postgres::Client) -> Self {
        Self { client }
    }
}

impl Ledger for PostgresLedger<'_> {
    fn ensure_table(&mut self) -> Result<()> {
        self.client.batch_execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version     BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at  TIMESTAMPTZ NOT NULL DEFAULT now()
            );",
        )?;
        Ok(())
    }

    fn columns(&mut self) -> Result<Vec<String>> {
        let rows = self.client.query(
            "SELECT column_name::text FROM information_schema.columns
             WHERE table_schema = current_schema() AND table_name = 'schema_version'",
            &[],
        )?;
        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    fn recorded_versions(&mut self) -> Result<Vec<i64>> {
        let rows = self
            .client
            .query("SELECT version::bigint FROM schema_version", &[])?;
        Ok(rows.iter().map(|row| row.get::<_, i64>(0)).collect())
    }

    fn apply(&mut self, migration: &Migration) -> Result<()> {
        let mut tx = self
            .client
            .transaction()
            .map_err(|e| migration_error(migration, e))?;
        tx.batch_execute(&migration.sql)
            .map_err(|e| migration_error(migration, e))?;
        let _ = tx
            .execute(
                "INSERT INTO schema_version (version, description, applied_at)
                 VALUES ($1, $2, now())",
                &[&i64::from(migration.version), &migration.name],
            )
            .map_err(|e| migration_error(migration, e))?;
        tx.commit().map_err(|e| migration_error(migration, e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
