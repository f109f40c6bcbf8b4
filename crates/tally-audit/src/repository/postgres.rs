//! Postgres audit repository. One auto-commit `INSERT` per event.

use ::postgres::Row;
use ::postgres::types::ToSql;
use chrono::Utc;
use tally_settings::Driver;
use tally_store::PostgresPool;
use tracing::debug;

use super::{AuditEvent, AuditQuery, AuditRepository};
use crate::errors::{AuditError, Result};

/// Audit repository over a Postgres pool.
#[derive(Clone)]
pub struct PostgresAudit {
    pool: PostgresPool,
}

impl PostgresAudit {
    /// Wrap an existing pool. The `audit_event` table must already exist.
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }
}

fn map_row(row: &Row) -> std::result::Result<AuditEvent, ::postgres::Error> {
    Ok(AuditEvent {
        id: row.try_get("id")?,
        event_type: row.try_get("type")?,
        identifier: row.try_get("identifier")?,
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
    })
}

impl AuditRepository for PostgresAudit {
    fn event(&self, event_type: &str, identifier: &str, message: &str) -> Result<()> {
        let mut client = self.pool.get()?;
        let _ = client.execute(
            "INSERT INTO audit_event (type, identifier, message, created_at)
             VALUES ($1, $2, $3, $4)",
            &[&event_type, &identifier, &message, &Utc::now()],
        )?;
        debug!(event_type, identifier, "audit event recorded");
        Ok(())
    }

    fn events(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        let mut sql = String::from(
            "SELECT id, type, identifier, message, created_at FROM audit_event WHERE TRUE",
        );
        let mut args: Vec<Box<dyn ToSql + Sync>> = Vec::new();
        if let Some(since) = query.since {
            args.push(Box::new(since));
            sql.push_str(&format!(" AND created_at >= ${}", args.len()));
        }
        if let Some(until) = query.until {
            args.push(Box::new(until));
            sql.push_str(&format!(" AND created_at < ${}", args.len()));
        }
        if let Some(event_type) = &query.event_type {
            args.push(Box::new(event_type.clone()));
            sql.push_str(&format!(" AND type = ${}", args.len()));
        }
        let order = query.order.sql();
        sql.push_str(&format!(" ORDER BY created_at {order}, id {order}"));
        if let Some(limit) = query.limit {
            args.push(Box::new(i64::from(limit)));
            sql.push_str(&format!(" LIMIT ${}", args.len()));
        }

        let params: Vec<&(dyn ToSql + Sync)> = args.iter().map(AsRef::as_ref).collect();
        let mut client = self.pool.get().map_err(AuditError::read)?;
        let rows = client.query(&sql, &params).map_err(AuditError::read)?;
        rows.iter()
            .map(map_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AuditError::read)
    }

    fn driver(&self) -> Driver {
        Driver::Postgres
    }
}
