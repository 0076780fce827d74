//! Conversation sessions and their accumulated model context.
//!
//! Each user-visible conversation is keyed by an opaque session id. The
//! remote model's conversational memory for a session is represented by a
//! [`ChatHandle`], owned exclusively by the [`SessionStore`]; every turn
//! reaches the handle through the streaming generator so the handle never
//! diverges from the history the caller renders.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message in a conversation, immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
        }
    }
}

/// One committed turn inside a chat handle.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// The conversational context carried across turns of one session.
///
/// Seeded from the caller's history minus the pending message, then grown by
/// one user/assistant exchange per completed turn. A turn that fails in
/// flight is not committed, so the handle stays consistent for retry.
#[derive(Debug, Clone)]
pub struct ChatHandle {
    system_prompt: String,
    turns: Vec<Turn>,
}

impl ChatHandle {
    /// Create a handle seeded with prior history and a system prompt.
    pub fn seeded(history: &[Message], system_prompt: &str) -> Self {
        let turns = history
            .iter()
            .map(|msg| Turn {
                role: msg.role,
                text: msg.content.clone(),
            })
            .collect();
        Self {
            system_prompt: system_prompt.to_string(),
            turns,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Append a completed user/assistant exchange.
    fn push_exchange(&mut self, user_text: String, assistant_text: String) {
        self.turns.push(Turn {
            role: Role::User,
            text: user_text,
        });
        self.turns.push(Turn {
            role: Role::Assistant,
            text: assistant_text,
        });
    }
}

#[derive(Default)]
struct StoreInner {
    handles: HashMap<String, ChatHandle>,
    // Sessions with a turn currently in flight; at most one per session.
    in_flight: HashSet<String>,
}

/// Process-wide mapping from session id to chat handle.
///
/// An explicit store object rather than ambient global state: clone it
/// cheaply and hand it to whoever needs it, and its lifetime follows the
/// embedding application.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the handle for a session, if one exists.
    pub fn get(&self, session_id: &str) -> Option<ChatHandle> {
        self.inner.lock().unwrap().handles.get(session_id).cloned()
    }

    /// Install (or replace) the handle for a session.
    pub fn put(&self, session_id: &str, handle: ChatHandle) {
        self.inner
            .lock()
            .unwrap()
            .handles
            .insert(session_id.to_string(), handle);
    }

    /// Drop the handle for a session. Removing an absent key is a no-op.
    pub fn remove(&self, session_id: &str) {
        self.inner.lock().unwrap().handles.remove(session_id);
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.lock().unwrap().handles.contains_key(session_id)
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the handle for a session, seeding one from `history` and
    /// `system_prompt` if absent. Returns a snapshot of the handle.
    pub(crate) fn ensure_handle(
        &self,
        session_id: &str,
        history: &[Message],
        system_prompt: &str,
    ) -> ChatHandle {
        let mut inner = self.inner.lock().unwrap();
        inner
            .handles
            .entry(session_id.to_string())
            .or_insert_with(|| ChatHandle::seeded(history, system_prompt))
            .clone()
    }

    /// Try to claim the single in-flight turn slot for a session.
    /// Returns false if a turn is already streaming.
    pub(crate) fn begin_turn(&self, session_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .in_flight
            .insert(session_id.to_string())
    }

    /// Release the in-flight slot for a session.
    pub(crate) fn end_turn(&self, session_id: &str) {
        self.inner.lock().unwrap().in_flight.remove(session_id);
    }

    /// Whether a turn is currently streaming for this session.
    pub fn turn_in_flight(&self, session_id: &str) -> bool {
        self.inner.lock().unwrap().in_flight.contains(session_id)
    }

    /// Commit a completed exchange to the session's handle.
    ///
    /// If the session was deleted while the turn was in flight there is
    /// nothing to commit; the exchange is dropped with the handle.
    pub(crate) fn commit_exchange(
        &self,
        session_id: &str,
        user_text: String,
        assistant_text: String,
    ) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(handle) = inner.handles.get_mut(session_id) {
            handle.push_exchange(user_text, assistant_text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_msg(id: &str, content: &str) -> Message {
        Message::new(id, Role::User, content)
    }

    fn assistant_msg(id: &str, content: &str) -> Message {
        Message::new(id, Role::Assistant, content)
    }

    #[test]
    fn test_handle_seeded_from_history() {
        let history = vec![
            user_msg("1", "ሰላም"),
            assistant_msg("2", "ሰላም! እንዴት ልርዳዎት?"),
        ];
        let handle = ChatHandle::seeded(&history, "be helpful");

        assert_eq!(handle.system_prompt(), "be helpful");
        assert_eq!(handle.turns().len(), 2);
        assert_eq!(handle.turns()[0].role, Role::User);
        assert_eq!(handle.turns()[1].role, Role::Assistant);
        assert_eq!(handle.turns()[1].text, "ሰላም! እንዴት ልርዳዎት?");
    }

    #[test]
    fn test_store_put_get_remove() {
        let store = SessionStore::new();
        assert!(store.get("s1").is_none());

        store.put("s1", ChatHandle::seeded(&[], "prompt"));
        assert!(store.contains("s1"));
        assert_eq!(store.len(), 1);

        store.remove("s1");
        assert!(store.get("s1").is_none());
        // Removing an absent key is a no-op, not an error.
        store.remove("s1");
        assert!(store.is_empty());
    }

    #[test]
    fn test_ensure_handle_creates_once() {
        let store = SessionStore::new();
        let history = vec![user_msg("1", "ሰላም")];

        let first = store.ensure_handle("s1", &history, "prompt");
        assert_eq!(first.turns().len(), 1);

        // A second call with different history must reuse the stored handle.
        let other = vec![user_msg("9", "ignored"), user_msg("10", "ignored too")];
        let second = store.ensure_handle("s1", &other, "other prompt");
        assert_eq!(second.turns().len(), 1);
        assert_eq!(second.system_prompt(), "prompt");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_commit_exchange_appends_in_order() {
        let store = SessionStore::new();
        store.put("s1", ChatHandle::seeded(&[], "prompt"));

        store.commit_exchange("s1", "Hello".to_string(), "Selam".to_string());

        let handle = store.get("s1").unwrap();
        assert_eq!(handle.turns().len(), 2);
        assert_eq!(handle.turns()[0].role, Role::User);
        assert_eq!(handle.turns()[0].text, "Hello");
        assert_eq!(handle.turns()[1].role, Role::Assistant);
        assert_eq!(handle.turns()[1].text, "Selam");
    }

    #[test]
    fn test_commit_after_delete_is_dropped() {
        let store = SessionStore::new();
        store.put("s1", ChatHandle::seeded(&[], "prompt"));
        store.remove("s1");

        store.commit_exchange("s1", "Hello".to_string(), "Selam".to_string());
        assert!(store.get("s1").is_none());
    }

    #[test]
    fn test_turn_slot_is_exclusive() {
        let store = SessionStore::new();
        assert!(store.begin_turn("s1"));
        assert!(!store.begin_turn("s1"));
        assert!(store.turn_in_flight("s1"));

        store.end_turn("s1");
        assert!(!store.turn_in_flight("s1"));
        assert!(store.begin_turn("s1"));
    }
}
