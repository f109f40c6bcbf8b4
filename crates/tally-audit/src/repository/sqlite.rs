//! `SQLite` audit repository.
//!
//! Writes take the database write lock up front with `BEGIN IMMEDIATE`, so
//! concurrent writers queue on `busy_timeout` instead of failing on a lock
//! upgrade. Timestamps are stored as fixed-width RFC 3339 text, which sorts
//! the same way lexically and chronologically.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{TransactionBehavior, params, params_from_iter};
use tally_settings::Driver;
use tally_store::SqlitePool;
use tracing::debug;

use super::{AuditEvent, AuditQuery, AuditRepository};
use crate::errors::{AuditError, Result};

/// Audit repository over a `SQLite` pool.
#[derive(Clone)]
pub struct SqliteAudit {
    pool: SqlitePool,
}

impl SqliteAudit {
    /// Wrap an existing pool. The `audit_event` table must already exist.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    let created_at: String = row.get(4)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    Ok(AuditEvent {
        id: row.get(0)?,
        event_type: row.get(1)?,
        identifier: row.get(2)?,
        message: row.get(3)?,
        created_at,
    })
}

impl AuditRepository for SqliteAudit {
    fn event(&self, event_type: &str, identifier: &str, message: &str) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let _ = tx.execute(
            "INSERT INTO audit_event (type, identifier, message, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![event_type, identifier, message, timestamp(Utc::now())],
        )?;
        tx.commit()?;
        debug!(event_type, identifier, "audit event recorded");
        Ok(())
    }

    fn events(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        let mut sql = String::from(
            "SELECT id, type, identifier, message, created_at FROM audit_event WHERE 1 = 1",
        );
        let mut args: Vec<Value> = Vec::new();
        if let Some(since) = query.since {
            sql.push_str(" AND created_at >= ?");
            args.push(Value::Text(timestamp(since)));
        }
        if let Some(until) = query.until {
            sql.push_str(" AND created_at < ?");
            args.push(Value::Text(timestamp(until)));
        }
        if let Some(event_type) = &query.event_type {
            sql.push_str(" AND type = ?");
            args.push(Value::Text(event_type.clone()));
        }
        let order = query.order.sql();
        sql.push_str(&format!(" ORDER BY created_at {order}, id {order}"));
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            args.push(Value::Integer(i64::from(limit)));
        }

        let conn = self.pool.get().map_err(AuditError::read)?;
        let mut stmt = conn.prepare(&sql).map_err(AuditError::read)?;
        let events = stmt
            .query_map(params_from_iter(args), map_row)
            .map_err(AuditError::read)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AuditError::read)?;
        Ok(events)
    }

    fn driver(&self) -> Driver {
        Driver::Sqlite
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};
    use tally_settings::{DatabaseConfig, SQLITE_MEMORY};
    use tally_store::Database;

    use super::*;

    fn repo() -> (Database, SqliteAudit) {
        let db = Database::connect(&DatabaseConfig::sqlite(SQLITE_MEMORY)).unwrap();
        let pool = db.sqlite_pool().unwrap().clone();
        pool.get()
            .unwrap()
            .execute_batch(
                "CREATE TABLE audit_event (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    type TEXT NOT NULL,
                    identifier TEXT NOT NULL,
                    message TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );",
            )
            .unwrap();
        (db, SqliteAudit::new(pool))
    }

    fn insert_at(repo: &SqliteAudit, event_type: &str, at: DateTime<Utc>) {
        let _ = repo
            .pool
            .get()
            .unwrap()
            .execute(
                "INSERT INTO audit_event (type, identifier, message, created_at)
                 VALUES (?1, 'id', 'msg', ?2)",
                params![event_type, timestamp(at)],
            )
            .unwrap();
    }

    #[test]
    fn event_round_trips() {
        let (_db, repo) = repo();
        let before = Utc::now();
        repo.event("login", "alice", "password accepted").unwrap();

        let events = repo.events(&AuditQuery::new()).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type, "login");
        assert_eq!(event.identifier, "alice");
        assert_eq!(event.message, "password accepted");
        assert!(event.created_at >= before - Duration::milliseconds(1));
        assert!(event.created_at <= Utc::now());
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(timestamp(whole), "2026-03-01T00:00:00.000000Z");
    }

    #[test]
    fn query_filters_and_orders() {
        let (_db, repo) = repo();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        insert_at(&repo, "login", t0);
        insert_at(&repo, "logout", t0 + Duration::minutes(1));
        insert_at(&repo, "login", t0 + Duration::minutes(2));
        insert_at(&repo, "login", t0 + Duration::minutes(3));

        let logins = repo.events(&AuditQuery::new().event_type("login")).unwrap();
        assert_eq!(logins.len(), 3);
        assert!(logins.windows(2).all(|w| w[0].created_at <= w[1].created_at));

        let window = repo
            .events(
                &AuditQuery::new()
                    .since(t0 + Duration::minutes(1))
                    .until(t0 + Duration::minutes(3)),
            )
            .unwrap();
        let types: Vec<&str> = window.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, ["logout", "login"]);

        let latest = repo.events(&AuditQuery::new().newest_first().limit(1)).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].created_at, t0 + Duration::minutes(3));
    }

    #[test]
    fn missing_table_is_write_error() {
        let db = Database::connect(&DatabaseConfig::sqlite(SQLITE_MEMORY)).unwrap();
        let repo = SqliteAudit::new(db.sqlite_pool().unwrap().clone());
        assert_matches!(repo.event("login", "alice", "ok"), Err(AuditError::Write(msg)) if msg.contains("audit_event"));
        assert_matches!(repo.events(&AuditQuery::new()), Err(AuditError::Read(_)));
    }
}
