//! # tally-audit
//!
//! Append-only audit events, written through whichever backend the
//! configured [`Database`] uses.
//!
//! - **Repositories**: [`SqliteAudit`] and [`PostgresAudit`] implement
//!   [`AuditRepository`]; [`repository_for`] picks one from a database handle
//! - **Facade**: [`AuditFacade`] forwards events to the bound repository and
//!   seals the binding on first use
//! - **Process-wide facade**: [`install`] once at startup, then [`event`] from
//!   anywhere
//!
//! ```ignore
//! let (db, _) = tally_store::open_and_migrate(&settings)?;
//! tally_audit::install_for(&db)?;
//! tally_audit::event("login", "alice", "password accepted")?;
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod facade;
pub mod repository;

use std::sync::Arc;

use tally_store::Database;

pub use errors::{AuditError, Result};
pub use facade::AuditFacade;
pub use repository::{
    AuditEvent, AuditQuery, AuditRepository, PostgresAudit, SortOrder, SqliteAudit,
    repository_for,
};

static GLOBAL: AuditFacade = AuditFacade::new();

/// The process-wide facade.
pub fn global() -> &'static AuditFacade {
    &GLOBAL
}

/// Bind `repository` into the process-wide facade.
///
/// Call before starting any thread that records events; fails with
/// [`AuditError::Sealed`] once an event has gone through.
pub fn install(repository: Arc<dyn AuditRepository>) -> Result<()> {
    GLOBAL.bind(repository)
}

/// Bind the repository matching `db`'s driver into the process-wide facade.
pub fn install_for(db: &Database) -> Result<()> {
    install(repository_for(db))
}

/// Record an event through the process-wide facade.
pub fn event(event_type: &str, identifier: &str, message: &str) -> Result<()> {
    GLOBAL.event(event_type, identifier, message)
}
