//! Audit error types.

use thiserror::Error;

/// Errors returned by audit repositories and the facade.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The event could not be written. Nothing was recorded.
    #[error("audit write failed: {0}")]
    Write(String),

    /// Recorded events could not be read back.
    #[error("audit read failed: {0}")]
    Read(String),

    /// The facade has no repository bound.
    #[error("no audit repository is bound")]
    Unbound,

    /// The facade has already forwarded an event and no longer accepts a
    /// new repository.
    #[error("audit repository is sealed after the first event")]
    Sealed,
}

impl AuditError {
    pub(crate) fn read(err: impl ToString) -> Self {
        Self::Read(err.to_string())
    }
}

impl From<rusqlite::Error> for AuditError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Write(err.to_string())
    }
}

impl From<postgres::Error> for AuditError {
    fn from(err: postgres::Error) -> Self {
        Self::Write(err.to_string())
    }
}

impl From<r2d2::Error> for AuditError {
    fn from(err: r2d2::Error) -> Self {
        Self::Write(format!("connection pool: {err}"))
    }
}

/// Convenience type alias for audit results.
pub type Result<T> = std::result::Result<T, AuditError>;
