//! Session store: one bounded conversation per sender.
//!
//! Sessions are created lazily on the first message from a sender and live
//! until the process exits, unless a session limit is configured, in which
//! case the least recently active sender is forgotten to make room.

use std::collections::HashMap;

use meshbridge_core::message::{SenderId, Turn};
use tracing::debug;

use crate::window::bound_history;

/// The bounded history of one sender.
#[derive(Debug, Clone, Default)]
struct Session {
    turns: Vec<Turn>,
    /// Store-wide sequence number of the last append, for eviction order.
    last_active: u64,
}

/// Registry of sessions keyed by sender.
///
/// Owned by a single dispatcher; every mutation goes through
/// [`SessionStore::append_and_bound`], which appends and trims before
/// returning, so no caller ever observes a session over its cap.
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<SenderId, Session>,
    history_cap: usize,
    max_sessions: Option<usize>,
    clock: u64,
}

impl SessionStore {
    /// A store keeping at most `history_cap` turns per sender.
    pub fn new(history_cap: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            history_cap,
            max_sessions: None,
            clock: 0,
        }
    }

    /// Limit the number of tracked senders.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = Some(max.max(1));
        self
    }

    /// Append a turn to the sender's session, trim it to the cap, and return
    /// the resulting history.
    pub fn append_and_bound(&mut self, sender: &SenderId, turn: Turn) -> &[Turn] {
        self.clock += 1;

        if !self.sessions.contains_key(sender) {
            self.make_room();
            debug!(sender = %sender, "Creating session");
        }

        let session = self.sessions.entry(sender.clone()).or_default();
        session.turns.push(turn);
        session.last_active = self.clock;

        let removed = bound_history(&mut session.turns, self.history_cap);
        if removed > 0 {
            debug!(sender = %sender, removed, kept = session.turns.len(), "Trimmed session history");
        }

        &session.turns
    }

    /// Current history for a sender; empty if the sender is unknown.
    pub fn history(&self, sender: &SenderId) -> &[Turn] {
        self.sessions
            .get(sender)
            .map(|s| s.turns.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, sender: &SenderId) -> bool {
        self.sessions.contains_key(sender)
    }

    /// Number of tracked senders.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Evict the least recently active session if the limit is reached.
    fn make_room(&mut self) {
        let Some(max) = self.max_sessions else {
            return;
        };

        while self.sessions.len() >= max {
            let Some(oldest) = self
                .sessions
                .iter()
                .min_by_key(|(_, s)| s.last_active)
                .map(|(id, _)| id.clone())
            else {
                return;
            };
            debug!(sender = %oldest, "Evicting least recently active session");
            self.sessions.remove(&oldest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(id: &str) -> SenderId {
        SenderId::from(id)
    }

    #[test]
    fn session_created_lazily() {
        let mut store = SessionStore::new(10);
        let alice = sender("!alice");
        assert!(!store.contains(&alice));
        assert!(store.history(&alice).is_empty());

        let history = store.append_and_bound(&alice, Turn::user("hi"));
        assert_eq!(history.len(), 1);
        assert!(store.contains(&alice));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn six_exchanges_with_cap_ten_drop_the_oldest_pair() {
        let mut store = SessionStore::new(10);
        let id = sender("!0a1b2c3d");

        for i in 0..6 {
            store.append_and_bound(&id, Turn::user(format!("q{i}")));
            store.append_and_bound(&id, Turn::assistant(format!("a{i}")));
        }

        let history = store.history(&id);
        assert_eq!(history.len(), 10);
        assert!(history.iter().all(|t| t.content() != "q0" && t.content() != "a0"));
        assert_eq!(history[0].content(), "q1");
        assert_eq!(history[9].content(), "a5");
    }

    #[test]
    fn history_never_exceeds_cap() {
        for cap in 0..6 {
            let mut store = SessionStore::new(cap);
            let id = sender("n");
            for i in 0..15 {
                let turn = if i % 2 == 0 { Turn::user("q") } else { Turn::assistant("a") };
                let len = store.append_and_bound(&id, turn).len();
                assert!(len <= cap);
            }
        }
    }

    #[test]
    fn zero_cap_is_always_empty() {
        let mut store = SessionStore::new(0);
        let id = sender("n");
        assert!(store.append_and_bound(&id, Turn::user("q")).is_empty());
        assert!(store.append_and_bound(&id, Turn::assistant("a")).is_empty());
        assert!(store.history(&id).is_empty());
    }

    #[test]
    fn senders_are_isolated() {
        let mut store = SessionStore::new(10);
        let a = sender("!aaaa");
        let b = sender("!bbbb");

        store.append_and_bound(&a, Turn::user("from a"));
        store.append_and_bound(&b, Turn::user("from b"));
        store.append_and_bound(&a, Turn::assistant("to a"));

        assert_eq!(store.history(&a).len(), 2);
        assert_eq!(store.history(&b).len(), 1);
        assert_eq!(store.history(&b)[0].content(), "from b");
        assert!(store.history(&a).iter().all(|t| t.content() != "from b"));
    }

    #[test]
    fn unbounded_by_default() {
        let mut store = SessionStore::new(2);
        for i in 0..500 {
            store.append_and_bound(&sender(&format!("!{i:08x}")), Turn::user("hi"));
        }
        assert_eq!(store.len(), 500);
    }

    #[test]
    fn evicts_least_recently_active() {
        let mut store = SessionStore::new(4).with_max_sessions(2);
        let (a, b, c) = (sender("a"), sender("b"), sender("c"));

        store.append_and_bound(&a, Turn::user("1"));
        store.append_and_bound(&b, Turn::user("2"));
        // a becomes the most recent
        store.append_and_bound(&a, Turn::assistant("3"));
        store.append_and_bound(&c, Turn::user("4"));

        assert_eq!(store.len(), 2);
        assert!(store.contains(&a));
        assert!(!store.contains(&b));
        assert!(store.contains(&c));
    }

    #[test]
    fn existing_sender_never_triggers_eviction() {
        let mut store = SessionStore::new(4).with_max_sessions(1);
        let a = sender("a");
        store.append_and_bound(&a, Turn::user("1"));
        store.append_and_bound(&a, Turn::assistant("2"));
        assert_eq!(store.history(&a).len(), 2);
    }
}
