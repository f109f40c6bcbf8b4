//! Audit event storage.
//!
//! [`AuditRepository`] is implemented once per backend. Each implementation
//! owns a clone of the pool and checks out a connection per call, so a single
//! `Arc<dyn AuditRepository>` can be shared by any number of threads.

mod postgres;
mod sqlite;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_settings::Driver;
use tally_store::{Backend, Database};

pub use self::postgres::PostgresAudit;
pub use self::sqlite::SqliteAudit;

use crate::errors::Result;

/// One row of `audit_event`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Backend-assigned id, increasing in insertion order.
    pub id: i64,
    /// Category, e.g. `login`.
    pub event_type: String,
    /// Subject of the event.
    pub identifier: String,
    /// Free-form detail.
    pub message: String,
    /// UTC time the row was written.
    pub created_at: DateTime<Utc>,
}

/// Sort direction for [`AuditQuery`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first.
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

impl SortOrder {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Filter for reading events back. The default matches everything, oldest
/// first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditQuery {
    /// Inclusive lower bound on `created_at`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub until: Option<DateTime<Utc>>,
    /// Exact match on the event type.
    pub event_type: Option<String>,
    /// Order by `created_at`, then `id`.
    pub order: SortOrder,
    /// Maximum rows returned.
    pub limit: Option<u32>,
}

impl AuditQuery {
    /// Match everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only events at or after `at`.
    #[must_use]
    pub fn since(mut self, at: DateTime<Utc>) -> Self {
        self.since = Some(at);
        self
    }

    /// Only events strictly before `at`.
    #[must_use]
    pub fn until(mut self, at: DateTime<Utc>) -> Self {
        self.until = Some(at);
        self
    }

    /// Only events of this type.
    #[must_use]
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Newest first.
    #[must_use]
    pub fn newest_first(mut self) -> Self {
        self.order = SortOrder::Descending;
        self
    }

    /// At most `limit` rows.
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Append-only store of audit events.
#[cfg_attr(test, mockall::automock)]
pub trait AuditRepository: Send + Sync {
    /// Record one event stamped with the current UTC time.
    ///
    /// Either the row is durably written or an error is returned.
    fn event(&self, event_type: &str, identifier: &str, message: &str) -> Result<()>;

    /// Read recorded events matching `query`.
    fn events(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>>;

    /// Backend this repository writes to.
    fn driver(&self) -> Driver;
}

/// Build the repository matching `db`'s driver.
///
/// The repository shares `db`'s pool and stays usable after `db` is closed.
pub fn repository_for(db: &Database) -> Arc<dyn AuditRepository> {
    match db.backend() {
        Backend::Sqlite(pool) => Arc::new(SqliteAudit::new(pool.clone())),
        Backend::Postgres(pool) => Arc::new(PostgresAudit::new(pool.clone())),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tally_settings::{DatabaseConfig, SQLITE_MEMORY};

    use super::*;

    #[test]
    fn query_builder_sets_fields() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let query = AuditQuery::new()
            .since(at)
            .event_type("login")
            .newest_first()
            .limit(5);
        assert_eq!(query.since, Some(at));
        assert_eq!(query.until, None);
        assert_eq!(query.event_type.as_deref(), Some("login"));
        assert_eq!(query.order, SortOrder::Descending);
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn repository_follows_database_driver() {
        let db = Database::connect(&DatabaseConfig::sqlite(SQLITE_MEMORY)).unwrap();
        assert_eq!(repository_for(&db).driver(), Driver::Sqlite);
    }

    #[test]
    fn event_serializes_camel_case() {
        let event = AuditEvent {
            id: 7,
            event_type: "login".into(),
            identifier: "alice".into(),
            message: "ok".into(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "login");
        assert_eq!(json["createdAt"], "2026-01-02T03:04:05Z");
    }
}
