//! # tally-store
//!
//! Database access for the tally stack:
//!
//! - **Connections**: [`Database`] wraps an `r2d2` pool for `SQLite` or
//!   Postgres, chosen by the configured [`Driver`](tally_settings::Driver)
//! - **Migrations**: [`MigrationStore`] discovers versioned `.sql` files and
//!   [`run_migrations`] applies the pending ones, each in its own transaction,
//!   recording them in the `schema_version` ledger

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;

pub use connection::{Backend, Database, PostgresPool, PragmaState, SqlitePool, verify_pragmas};
pub use errors::{LoadError, Result, StoreError};
pub use migrations::{
    Migration, MigrationReport, MigrationStore, applied_versions, current_version, pending,
    run_migrations,
};

use tally_settings::TallySettings;

/// Connect with `settings.database` and bring the schema up to date from
/// `settings.migrations.dir`.
///
/// The handle is dropped again if loading or applying migrations fails.
pub fn open_and_migrate(settings: &TallySettings) -> Result<(Database, MigrationReport)> {
    let db = Database::connect(&settings.database)?;
    let store = MigrationStore::load(&settings.migrations.dir, db.driver())?;
    let report = run_migrations(&db, &store)?;
    Ok((db, report))
}
