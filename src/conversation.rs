//! Conversation history store
//!
//! An ordered log of role-tagged messages with a pinned system prompt at the
//! front and a cap on how many user/assistant messages are retained.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of user/assistant exchanges kept in history
pub const DEFAULT_MAX_PAIRS: usize = 10;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name used by chat completion APIs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    /// Create a message stamped with the current time
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Immutable copy of the history, safe to hand to a worker task
pub type HistorySnapshot = Arc<[ConversationMessage]>;

/// Summary of the exchanges held in history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationSummary {
    /// Number of user turns currently retained
    pub total_exchanges: usize,
    pub last_user_message: Option<String>,
    pub last_assistant_message: Option<String>,
}

/// Bounded conversation history
///
/// Index 0 holds the system message when one is set. It is never evicted by
/// trimming and survives [`clear`](Self::clear).
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: Vec<ConversationMessage>,
    max_pairs: usize,
}

impl ConversationHistory {
    /// Create an empty history that keeps at most `max_pairs` exchanges
    #[must_use]
    pub const fn new(max_pairs: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_pairs,
        }
    }

    /// Create a history seeded with a system prompt
    #[must_use]
    pub fn with_system_prompt(prompt: impl Into<String>, max_pairs: usize) -> Self {
        Self {
            messages: vec![ConversationMessage::system(prompt)],
            max_pairs,
        }
    }

    /// Append a message
    ///
    /// A system message replaces the pinned prompt instead of landing at the
    /// end, so the system role only ever appears at index 0.
    pub fn append(&mut self, message: ConversationMessage) {
        if message.role == Role::System {
            self.set_system_prompt(message.content);
            return;
        }
        self.messages.push(message);
    }

    /// Drop the oldest non-system messages until at most `max_pairs`
    /// exchanges remain
    ///
    /// Returns the number of messages evicted.
    pub fn trim_to_cap(&mut self) -> usize {
        let start = usize::from(self.has_system());
        let cap = self.max_pairs.saturating_mul(2);
        let body = self.messages.len() - start;
        if body <= cap {
            return 0;
        }

        let excess = body - cap;
        self.messages.drain(start..start + excess);
        tracing::debug!(evicted = excess, retained = self.messages.len(), "history trimmed");
        excess
    }

    /// Reset to the system message only (or empty when none is set)
    pub fn clear(&mut self) {
        let keep = usize::from(self.has_system());
        self.messages.truncate(keep);
    }

    /// Copy of the current history for use as a request payload
    #[must_use]
    pub fn snapshot(&self) -> HistorySnapshot {
        Arc::from(self.messages.as_slice())
    }

    /// Replace the system prompt, inserting one if absent
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        let message = ConversationMessage::system(prompt);
        if self.has_system() {
            self.messages[0] = message;
        } else {
            self.messages.insert(0, message);
        }
    }

    /// The pinned system prompt, if any
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Summarize retained exchanges
    #[must_use]
    pub fn summary(&self) -> ConversationSummary {
        let last_of = |role: Role| {
            self.messages
                .iter()
                .rev()
                .find(|m| m.role == role)
                .map(|m| m.content.clone())
        };

        ConversationSummary {
            total_exchanges: self.messages.iter().filter(|m| m.role == Role::User).count(),
            last_user_message: last_of(Role::User),
            last_assistant_message: last_of(Role::Assistant),
        }
    }

    /// Borrow the retained messages in order
    #[must_use]
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Configured exchange cap
    #[must_use]
    pub const fn max_pairs(&self) -> usize {
        self.max_pairs
    }

    fn has_system(&self) -> bool {
        self.messages.first().is_some_and(|m| m.role == Role::System)
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAIRS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles_and_content(history: &ConversationHistory) -> Vec<(Role, &str)> {
        history
            .messages()
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect()
    }

    fn push_pair(history: &mut ConversationHistory, n: usize) {
        history.append(ConversationMessage::user(format!("u{n}")));
        history.append(ConversationMessage::assistant(format!("a{n}")));
    }

    #[test]
    fn test_clear_keeps_system_prompt() {
        let mut history = ConversationHistory::with_system_prompt("be brief", 10);
        push_pair(&mut history, 1);
        push_pair(&mut history, 2);

        history.clear();

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].role, Role::System);
        assert_eq!(snapshot[0].content, "be brief");
    }

    #[test]
    fn test_clear_without_system_prompt_empties() {
        let mut history = ConversationHistory::new(10);
        push_pair(&mut history, 1);

        history.clear();
        assert!(history.snapshot().is_empty());
    }

    #[test]
    fn test_trim_keeps_most_recent_pairs() {
        let mut history = ConversationHistory::with_system_prompt("sys", 2);
        for n in 1..=3 {
            push_pair(&mut history, n);
            history.trim_to_cap();
        }

        assert_eq!(
            roles_and_content(&history),
            vec![
                (Role::System, "sys"),
                (Role::User, "u2"),
                (Role::Assistant, "a2"),
                (Role::User, "u3"),
                (Role::Assistant, "a3"),
            ]
        );
    }

    #[test]
    fn test_trim_for_any_overflow() {
        for k in 0..5 {
            let mut history = ConversationHistory::with_system_prompt("sys", 3);
            for n in 0..3 + k {
                push_pair(&mut history, n);
            }
            history.trim_to_cap();

            assert_eq!(history.len(), 1 + 3 * 2, "k = {k}");
            assert_eq!(history.messages()[0].role, Role::System);
            assert_eq!(history.messages()[1].content, format!("u{k}"));
            assert_eq!(history.messages()[6].content, format!("a{}", k + 2));
        }
    }

    #[test]
    fn test_default_cap_is_21_entries() {
        let mut history = ConversationHistory::with_system_prompt("sys", DEFAULT_MAX_PAIRS);
        for n in 0..15 {
            push_pair(&mut history, n);
        }

        assert_eq!(history.trim_to_cap(), 10);
        assert_eq!(history.len(), 21);
    }

    #[test]
    fn test_under_cap_never_evicts() {
        let mut history = ConversationHistory::with_system_prompt("sys", 4);
        push_pair(&mut history, 1);
        history.append(ConversationMessage::user("dangling"));

        assert_eq!(history.trim_to_cap(), 0);
        assert_eq!(history.system_prompt(), Some("sys"));
        assert_eq!(history.len(), 4);
    }

    #[test]
    fn test_snapshot_does_not_alias() {
        let mut history = ConversationHistory::new(10);
        history.append(ConversationMessage::user("hello"));
        let snapshot = history.snapshot();

        history.append(ConversationMessage::assistant("hi"));
        history.clear();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].content, "hello");
    }

    #[test]
    fn test_system_message_is_pinned() {
        let mut history = ConversationHistory::new(10);
        history.append(ConversationMessage::user("hello"));
        history.append(ConversationMessage::system("new prompt"));

        assert_eq!(
            roles_and_content(&history),
            vec![(Role::System, "new prompt"), (Role::User, "hello")]
        );

        history.set_system_prompt("replaced");
        assert_eq!(history.system_prompt(), Some("replaced"));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_summary() {
        let mut history = ConversationHistory::with_system_prompt("sys", 10);
        assert_eq!(history.summary(), ConversationSummary::default());

        push_pair(&mut history, 1);
        history.append(ConversationMessage::user("latest"));

        let summary = history.summary();
        assert_eq!(summary.total_exchanges, 2);
        assert_eq!(summary.last_user_message.as_deref(), Some("latest"));
        assert_eq!(summary.last_assistant_message.as_deref(), Some("a1"));
    }

    #[test]
    fn test_message_serializes_with_wire_role() {
        let message = ConversationMessage::assistant("hi there");
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], "hi there");
        assert!(value["created_at"].is_string());
    }
}
