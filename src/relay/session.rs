//! Relay Session Store
//!
//! Sessions are volatile (RAM only) and one-shot: a sender's selection is
//! removed by the first message relayed after it, whatever the outcome.

use super::directory::Recipient;
use crate::telegram::traits::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Pending recipient selection of one anonymous sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySession {
    pub sender: UserId,
    pub recipient: Recipient,
}

/// Sender -> pending selection
///
/// Cloning shares the underlying map. Each operation holds the lock only for
/// the map access itself, never across network I/O.
#[derive(Debug, Clone, Default)]
pub struct RelaySessionStore {
    sessions: Arc<Mutex<HashMap<UserId, RelaySession>>>,
}

impl RelaySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<UserId, RelaySession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a selection; last selection wins. Returns the one it replaced.
    pub fn put(&self, session: RelaySession) -> Option<RelaySession> {
        self.sessions().insert(session.sender, session)
    }

    /// Current selection of `sender`, if any
    pub fn get(&self, sender: UserId) -> Option<RelaySession> {
        self.sessions().get(&sender).cloned()
    }

    /// Remove and return the selection of `sender`.
    ///
    /// Atomic: of two concurrent callers, only one gets the session.
    pub fn take(&self, sender: UserId) -> Option<RelaySession> {
        self.sessions().remove(&sender)
    }

    /// Number of senders with a pending selection
    pub fn active_count(&self) -> usize {
        self.sessions().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(sender: i64, label: &str, recipient: i64) -> RelaySession {
        RelaySession {
            sender: UserId(sender),
            recipient: Recipient {
                label: label.to_string(),
                display_name: label.to_string(),
                id: UserId(recipient),
            },
        }
    }

    #[test]
    fn test_last_selection_wins() {
        let store = RelaySessionStore::new();

        assert!(store.put(session(1, "head", 10)).is_none());
        let replaced = store.put(session(1, "deputy", 20)).unwrap();

        assert_eq!(replaced.recipient.label, "head");
        assert_eq!(store.get(UserId(1)).unwrap().recipient.id, UserId(20));
        assert_eq!(store.active_count(), 1);
    }

    #[test]
    fn test_take_consumes_once() {
        let store = RelaySessionStore::new();
        store.put(session(1, "head", 10));

        assert!(store.take(UserId(1)).is_some());
        assert!(store.take(UserId(1)).is_none());
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let store = RelaySessionStore::new();
        let other = store.clone();

        store.put(session(1, "head", 10));
        assert!(other.get(UserId(1)).is_some());
    }

    #[test]
    fn test_concurrent_take_yields_single_winner() {
        let store = RelaySessionStore::new();
        store.put(session(1, "head", 10));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.take(UserId(1)).is_some())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
