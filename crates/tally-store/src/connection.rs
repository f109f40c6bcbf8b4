//! Pooled connections for every supported backend.
//!
//! `SQLite` uses `r2d2_sqlite` with a pragma customizer that sets the busy
//! timeout, WAL mode and foreign keys on each new connection. Postgres
//! uses `r2d2_postgres` over `NoTls`. Both pools open their connections
//! eagerly, so [`Database::connect`] fails fast on a bad path or an
//! unreachable server.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use postgres::NoTls;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use secrecy::ExposeSecret;
use tally_settings::{ConnectionDetails, DatabaseConfig, Driver, SslMode};
use tracing::{debug, info};

use crate::errors::{Result, StoreError};

/// Pool of `SQLite` connections.
pub type SqlitePool = Pool<SqliteConnectionManager>;

/// Pool of Postgres clients.
pub type PostgresPool = Pool<PostgresConnectionManager<NoTls>>;

/// The live pool behind a [`Database`], one variant per driver.
#[derive(Clone)]
pub enum Backend {
    /// Embedded `SQLite` file (or private in-memory database).
    Sqlite(SqlitePool),
    /// Networked Postgres server.
    Postgres(PostgresPool),
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, state) = match self {
            Self::Sqlite(pool) => ("Sqlite", pool.state()),
            Self::Postgres(pool) => ("Postgres", pool.state()),
        };
        f.debug_struct(name)
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}

/// `SQLite` pragma customizer that runs on each new connection.
#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout = {};\
             PRAGMA journal_mode = WAL;\
             PRAGMA foreign_keys = ON;\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))
    }
}

/// Handle to an open database.
///
/// Owned by whoever called [`Database::connect`]. Dropping it (or calling
/// [`Database::close`]) releases the handle's pool reference; repositories
/// built from it hold their own pool clones.
#[derive(Debug)]
pub struct Database {
    backend: Backend,
    target: String,
}

impl Database {
    /// Validate `config` and open a pool for its driver.
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let details = &config.connection_details;

        let (backend, target) = match config.driver {
            Driver::Sqlite => (Backend::Sqlite(open_sqlite(details)?), details.database.clone()),
            Driver::Postgres => (
                Backend::Postgres(open_postgres(details)?),
                format!("{}:{}/{}", details.host, details.port, details.database),
            ),
        };

        info!(driver = %config.driver, db = %target, "database opened");
        Ok(Self { backend, target })
    }

    /// Open a database, run `f` against it, then close it on every path.
    pub fn scoped<T, E, F>(config: &DatabaseConfig, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Database) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let db = Self::connect(config)?;
        let result = f(&db);
        db.close();
        result
    }

    /// Which backend this handle talks to.
    pub fn driver(&self) -> Driver {
        match self.backend {
            Backend::Sqlite(_) => Driver::Sqlite,
            Backend::Postgres(_) => Driver::Postgres,
        }
    }

    /// The underlying pool.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The `SQLite` pool, if this is a `SQLite` database.
    pub fn sqlite_pool(&self) -> Option<&SqlitePool> {
        match &self.backend {
            Backend::Sqlite(pool) => Some(pool),
            Backend::Postgres(_) => None,
        }
    }

    /// The Postgres pool, if this is a Postgres database.
    pub fn postgres_pool(&self) -> Option<&PostgresPool> {
        match &self.backend {
            Backend::Postgres(pool) => Some(pool),
            Backend::Sqlite(_) => None,
        }
    }

    /// Round-trip a trivial query.
    pub fn ping(&self) -> Result<()> {
        match &self.backend {
            Backend::Sqlite(pool) => {
                let conn = pool.get()?;
                let _: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
            }
            Backend::Postgres(pool) => {
                let mut client = pool.get()?;
                client.batch_execute("SELECT 1")?;
            }
        }
        Ok(())
    }

    /// Release the handle.
    pub fn close(self) {
        info!(driver = %self.driver(), db = %self.target, "closing database");
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        debug!(db = %self.target, "database handle released");
    }
}

fn connection_error(driver: Driver, message: impl ToString) -> StoreError {
    StoreError::Connection {
        driver,
        message: message.to_string(),
    }
}

fn open_sqlite(details: &ConnectionDetails) -> Result<SqlitePool> {
    // A pool of private in-memory databases would hand each caller a
    // different schema; pin it to one connection.
    let (manager, max_size) = if details.is_memory() {
        (SqliteConnectionManager::memory(), 1)
    } else {
        let path = Path::new(&details.database);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                connection_error(
                    Driver::Sqlite,
                    format!("create directory {}: {e}", parent.display()),
                )
            })?;
        }
        (SqliteConnectionManager::file(path), details.max_connections)
    };

    Pool::builder()
        .max_size(max_size)
        .connection_timeout(Duration::from_secs(details.connect_timeout_secs))
        .connection_customizer(Box::new(PragmaCustomizer {
            busy_timeout_ms: details.busy_timeout_ms,
        }))
        .build(manager)
        .map_err(|e| connection_error(Driver::Sqlite, e))
}

fn open_postgres(details: &ConnectionDetails) -> Result<PostgresPool> {
    let mut config = postgres::Config::new();
    let _ = config
        .host(&details.host)
        .port(details.port)
        .user(&details.username)
        .dbname(&details.database)
        .connect_timeout(Duration::from_secs(details.connect_timeout_secs))
        .ssl_mode(match details.ssl_mode {
            SslMode::Disable => postgres::config::SslMode::Disable,
            SslMode::Prefer => postgres::config::SslMode::Prefer,
            SslMode::Require => postgres::config::SslMode::Require,
        });
    if let Some(password) = &details.password {
        let _ = config.password(password.expose_secret());
    }

    let manager = PostgresConnectionManager::new(config, NoTls);
    Pool::builder()
        .max_size(details.max_connections)
        .connection_timeout(Duration::from_secs(details.connect_timeout_secs))
        .build(manager)
        .map_err(|e| connection_error(Driver::Postgres, e))
}

/// Verify pragmas are set correctly on a connection.
pub fn verify_pragmas(conn: &Connection) -> Result<PragmaState> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    let busy_timeout_ms: u32 = conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0))?;
    Ok(PragmaState {
        journal_mode,
        foreign_keys_enabled: foreign_keys == 1,
        busy_timeout_ms,
    })
}

/// Pragma state for verification.
#[derive(Debug)]
pub struct PragmaState {
    /// Journal mode (`wal` for files, `memory` in memory).
    pub journal_mode: String,
    /// Whether foreign keys are enabled.
    pub foreign_keys_enabled: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
