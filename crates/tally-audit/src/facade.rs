//! The audit facade: a rebindable-until-first-use slot for the active
//! [`AuditRepository`].
//!
//! Bind the repository during startup, before any thread records an event.
//! The first forwarded event seals the facade; later [`AuditFacade::bind`]
//! calls fail with [`AuditError::Sealed`], so every event of a process run
//! goes to one backend.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::errors::{AuditError, Result};
use crate::repository::AuditRepository;

/// Forwards events to the bound [`AuditRepository`].
pub struct AuditFacade {
    repository: RwLock<Option<Arc<dyn AuditRepository>>>,
    sealed: AtomicBool,
}

impl AuditFacade {
    /// An unbound, unsealed facade. Usable in a `static`.
    pub const fn new() -> Self {
        Self {
            repository: parking_lot::const_rwlock(None),
            sealed: AtomicBool::new(false),
        }
    }

    /// A facade already bound to `repository`.
    pub fn with_repository(repository: Arc<dyn AuditRepository>) -> Self {
        Self {
            repository: RwLock::new(Some(repository)),
            sealed: AtomicBool::new(false),
        }
    }

    /// Make `repository` the target of subsequent events.
    ///
    /// Replaces any previous binding until the first event has been
    /// forwarded.
    pub fn bind(&self, repository: Arc<dyn AuditRepository>) -> Result<()> {
        let mut slot = self.repository.write();
        // Checked under the write lock: `event` seals while holding the read lock.
        if self.sealed.load(Ordering::Acquire) {
            warn!(driver = %repository.driver(), "audit repository already in use, rebind refused");
            return Err(AuditError::Sealed);
        }
        info!(driver = %repository.driver(), "audit repository bound");
        *slot = Some(repository);
        Ok(())
    }

    /// Record an event through the bound repository.
    pub fn event(&self, event_type: &str, identifier: &str, message: &str) -> Result<()> {
        let repository = {
            let slot = self.repository.read();
            let repository = slot.clone().ok_or(AuditError::Unbound)?;
            self.sealed.store(true, Ordering::Release);
            repository
        };
        repository.event(event_type, identifier, message)
    }

    /// The bound repository, if any.
    pub fn repository(&self) -> Option<Arc<dyn AuditRepository>> {
        self.repository.read().clone()
    }

    /// Whether an event has been forwarded.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }
}

impl Default for AuditFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AuditFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditFacade")
            .field("driver", &self.repository.read().as_ref().map(|r| r.driver()))
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
