//! Simulation authority.
//!
//! Exactly one process runs the encounter; everyone else only reads the
//! published snapshots. Components receive a clone of the same [`Authority`]
//! at construction and gate every mutation on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "am I authoritative" predicate.
#[derive(Debug, Clone)]
pub struct Authority {
    authoritative: Arc<AtomicBool>,
}

impl Authority {
    /// Authority for the simulating host.
    #[must_use]
    pub fn server() -> Self {
        Self {
            authoritative: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Authority for a read-only observer.
    #[must_use]
    pub fn observer() -> Self {
        Self {
            authoritative: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether this process may mutate simulation state.
    #[must_use]
    pub fn is_authoritative(&self) -> bool {
        self.authoritative.load(Ordering::Acquire)
    }

    /// Changes the role for every holder of this authority (host migration).
    pub fn set_authoritative(&self, authoritative: bool) {
        self.authoritative.store(authoritative, Ordering::Release);
    }
}

impl Default for Authority {
    fn default() -> Self {
        Self::server()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles() {
        assert!(Authority::server().is_authoritative());
        assert!(!Authority::observer().is_authoritative());
    }

    #[test]
    fn test_clones_share_role() {
        let a = Authority::server();
        let b = a.clone();
        a.set_authoritative(false);
        assert!(!b.is_authoritative());
    }
}
