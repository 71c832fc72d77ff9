//! Room registry
//!
//! The table of currently joined sessions, keyed by display name. Every
//! access goes through one lock; check-and-insert happens under a single
//! write guard.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::session::Session;

/// Shared table of joined sessions
///
/// Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session under its identity
    ///
    /// Returns false, leaving the table untouched, if the name is taken.
    pub fn try_register(&self, session: Session) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        match sessions.entry(session.identity().to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(session);
                debug!("Total clients: {}", sessions.len());
                true
            }
        }
    }

    /// Remove a session by identity; returns whether one was removed
    pub fn deregister(&self, identity: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let removed = sessions.remove(identity).is_some();
        if removed {
            debug!("Total clients: {}", sessions.len());
        }
        removed
    }

    /// Queue `line` for every session except `excluded`
    ///
    /// Only enqueues; a full outbox drops the line for that session alone.
    pub fn broadcast_except(&self, excluded: &str, line: &str) {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        for (name, session) in sessions.iter() {
            if name != excluded {
                session.send(line.to_string());
            }
        }
    }

    /// Force every registered session's transport closed
    pub fn close_all(&self) {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        for session in sessions.values() {
            session.close();
        }
    }

    /// Whether `identity` is currently joined
    pub fn contains(&self, identity: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(identity)
    }

    /// Number of joined sessions
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
