//! In-memory chat session store with lifecycle control.
//!
//! Sessions are created implicitly on first append, cleared (history
//! emptied, id still resolvable), or deleted (all trace removed; reusing
//! the id starts a fresh session). A `DashMap` provides per-session
//! entry locks, so mutations to one session are serialized while
//! different sessions proceed independently.
//!
//! Stored history is capped at `max_messages` (oldest trimmed first).
//! History handed to prompt assembly is additionally capped by
//! `prompt_messages` and `prompt_char_budget`, whichever is reached
//! first — this is what keeps prompt growth bounded.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::error::{RagError, Result};
use crate::models::{Feedback, Message, SessionSummary};

/// Session retention and prompt-window settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hard cap on stored messages per session.
    pub max_messages: usize,
    /// Most-recent messages considered for prompt assembly.
    pub prompt_messages: usize,
    /// Total character budget for prompt history.
    pub prompt_char_budget: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_messages: 100,
            prompt_messages: 10,
            prompt_char_budget: 8000,
        }
    }
}

#[derive(Debug)]
struct SessionEntry {
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl SessionEntry {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            messages: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }
}

/// Thread-safe store of chat sessions.
pub struct SessionStore {
    config: SessionConfig,
    sessions: DashMap<String, SessionEntry>,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Append one message, creating the session if absent. Trims the
    /// oldest messages beyond `max_messages`.
    pub fn append(&self, session_id: &str, message: Message) {
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionEntry::new);
        entry.messages.push(message);
        Self::trim(&mut entry.messages, self.config.max_messages);
        entry.last_activity = Utc::now();
    }

    /// Append a user/assistant pair under a single entry lock so the two
    /// messages land adjacently and atomically.
    pub fn append_exchange(&self, session_id: &str, user: Message, assistant: Message) {
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionEntry::new);
        entry.messages.push(user);
        entry.messages.push(assistant);
        Self::trim(&mut entry.messages, self.config.max_messages);
        entry.last_activity = Utc::now();
    }

    fn trim(messages: &mut Vec<Message>, cap: usize) {
        if messages.len() > cap {
            let excess = messages.len() - cap;
            messages.drain(..excess);
        }
    }

    /// Full stored history. `use_history = false` yields an empty vector
    /// regardless of stored state (a stateless turn); so does an unknown
    /// session id.
    pub fn history(&self, session_id: &str, use_history: bool) -> Vec<Message> {
        if !use_history {
            return Vec::new();
        }
        self.sessions
            .get(session_id)
            .map(|e| e.messages.clone())
            .unwrap_or_default()
    }

    /// Most-recent messages for prompt assembly, capped by message count
    /// and character budget, whichever is reached first. Oldest-first
    /// order is preserved.
    pub fn history_for_prompt(&self, session_id: &str) -> Vec<Message> {
        let Some(entry) = self.sessions.get(session_id) else {
            return Vec::new();
        };

        let mut window: Vec<Message> = Vec::new();
        let mut used = 0usize;
        for msg in entry.messages.iter().rev() {
            if window.len() == self.config.prompt_messages {
                break;
            }
            if used + msg.content.len() > self.config.prompt_char_budget && !window.is_empty() {
                break;
            }
            used += msg.content.len();
            window.push(msg.clone());
        }
        window.reverse();
        window
    }

    /// Empty a session's history; the id remains resolvable and listed.
    pub fn clear(&self, session_id: &str) -> Result<()> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RagError::session_not_found(session_id))?;
        entry.messages.clear();
        entry.last_activity = Utc::now();
        Ok(())
    }

    /// Remove a session entirely. Reusing the id afterwards starts a
    /// fresh session.
    pub fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| RagError::session_not_found(session_id))
    }

    /// Summaries of all sessions, most recently active first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|e| SessionSummary {
                id: e.key().clone(),
                message_count: e.messages.len(),
                created_at: e.created_at,
                last_activity: e.last_activity,
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| a.id.cmp(&b.id))
        });
        summaries
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Attach feedback to a stored message. The rating must be 1–5 and
    /// the index must address an existing message.
    pub fn attach_feedback(
        &self,
        session_id: &str,
        message_index: usize,
        feedback: Feedback,
    ) -> Result<()> {
        if !(1..=5).contains(&feedback.rating) {
            return Err(RagError::InvalidArgument(format!(
                "rating must be between 1 and 5, got {}",
                feedback.rating
            )));
        }
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RagError::session_not_found(session_id))?;
        let len = entry.messages.len();
        let message = entry.messages.get_mut(message_index).ok_or_else(|| {
            RagError::InvalidArgument(format!(
                "message index {} out of range (session has {} messages)",
                message_index, len
            ))
        })?;
        message.feedback = Some(feedback);
        Ok(())
    }

    /// Drop sessions idle longer than `max_idle`. Returns how many were
    /// removed.
    pub fn expire_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let before = self.sessions.len();
        self.sessions.retain(|_, e| e.last_activity >= cutoff);
        before - self.sessions.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn store(max: usize, prompt: usize, budget: usize) -> SessionStore {
        SessionStore::new(SessionConfig {
            max_messages: max,
            prompt_messages: prompt,
            prompt_char_budget: budget,
        })
    }

    #[test]
    fn test_append_creates_session() {
        let store = SessionStore::default();
        store.append("s1", Message::user("hello"));
        assert_eq!(store.session_count(), 1);
        assert_eq!(store.history("s1", true).len(), 1);
    }

    #[test]
    fn test_history_respects_use_history_flag() {
        let store = SessionStore::default();
        store.append("s1", Message::user("hello"));
        assert!(store.history("s1", false).is_empty());
        assert!(store.history("unknown", true).is_empty());
    }

    #[test]
    fn test_stored_cap_retains_most_recent() {
        let store = store(4, 10, 100_000);
        for i in 0..10 {
            store.append("s1", Message::user(format!("msg-{}", i)));
        }
        let history = store.history("s1", true);
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "msg-6");
        assert_eq!(history[3].content, "msg-9");
    }

    #[test]
    fn test_prompt_window_message_cap() {
        let store = store(100, 3, 100_000);
        for i in 0..8 {
            store.append("s1", Message::user(format!("msg-{}", i)));
        }
        let window = store.history_for_prompt("s1");
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].content, "msg-5");
        assert_eq!(window[2].content, "msg-7");
    }

    #[test]
    fn test_prompt_window_char_budget() {
        let store = store(100, 10, 25);
        store.append("s1", Message::user("aaaaaaaaaa")); // 10 chars
        store.append("s1", Message::user("bbbbbbbbbb"));
        store.append("s1", Message::user("cccccccccc"));
        let window = store.history_for_prompt("s1");
        // 25-char budget fits two 10-char messages, not three.
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].content, "bbbbbbbbbb");
        assert_eq!(window[1].content, "cccccccccc");
    }

    #[test]
    fn test_prompt_window_always_includes_latest() {
        let store = store(100, 10, 5);
        store.append("s1", Message::user("a very long latest message"));
        let window = store.history_for_prompt("s1");
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_clear_keeps_session_resolvable() {
        let store = SessionStore::default();
        store.append("s1", Message::user("hello"));
        store.clear("s1").unwrap();
        assert!(store.history("s1", true).is_empty());
        assert_eq!(store.session_count(), 1);
        // A cleared session accepts new messages under the same id.
        store.append("s1", Message::user("again"));
        assert_eq!(store.history("s1", true).len(), 1);
        assert!(matches!(
            store.clear("missing"),
            Err(RagError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_removes_all_trace() {
        let store = SessionStore::default();
        store.append("s1", Message::user("hello"));
        store.delete("s1").unwrap();
        assert_eq!(store.session_count(), 0);
        assert!(matches!(
            store.delete("s1"),
            Err(RagError::NotFound { .. })
        ));
        // Reuse starts fresh.
        store.append("s1", Message::user("fresh"));
        assert_eq!(store.history("s1", true).len(), 1);
    }

    #[test]
    fn test_append_exchange_is_ordered() {
        let store = SessionStore::default();
        store.append_exchange(
            "s1",
            Message::user("question"),
            Message::assistant("answer", Vec::new()),
        );
        let history = store.history("s1", true);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[test]
    fn test_feedback_validation() {
        let store = SessionStore::default();
        store.append("s1", Message::user("hello"));

        assert!(matches!(
            store.attach_feedback(
                "s1",
                0,
                Feedback {
                    rating: 6,
                    comment: None
                }
            ),
            Err(RagError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.attach_feedback(
                "s1",
                5,
                Feedback {
                    rating: 3,
                    comment: None
                }
            ),
            Err(RagError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.attach_feedback(
                "nope",
                0,
                Feedback {
                    rating: 3,
                    comment: None
                }
            ),
            Err(RagError::NotFound { .. })
        ));

        store
            .attach_feedback(
                "s1",
                0,
                Feedback {
                    rating: 4,
                    comment: Some("helpful".into()),
                },
            )
            .unwrap();
        let history = store.history("s1", true);
        assert_eq!(history[0].feedback.as_ref().unwrap().rating, 4);
    }

    #[test]
    fn test_expire_idle() {
        let store = SessionStore::default();
        store.append("s1", Message::user("hello"));
        // Nothing is older than an hour.
        assert_eq!(store.expire_idle(Duration::hours(1)), 0);
        // Everything is older than "negative" idle time.
        assert_eq!(store.expire_idle(Duration::seconds(-1)), 1);
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn test_list_orders_by_recency() {
        let store = SessionStore::default();
        store.append("a", Message::user("first"));
        store.append("b", Message::user("second"));
        let listed = store.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "b");
        assert_eq!(listed[0].message_count, 1);
    }
}
