//! Conversation history — persisted chat sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::HistoryError;
use crate::message::Message;

/// A saved conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,

    /// Short label, usually derived from the first user prompt
    pub title: String,

    pub provider: String,
    pub model: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Session {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: String::new(),
            provider: provider.into(),
            model: model.into(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Append a message, titling the session from the first user prompt.
    pub fn push(&mut self, message: Message) {
        if self.title.is_empty() && message.role == crate::message::Role::User {
            self.title = title_from(&message.content);
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
    }
}

fn title_from(prompt: &str) -> String {
    let line = prompt.lines().next().unwrap_or("").trim();
    let mut title: String = line.chars().take(60).collect();
    if line.chars().count() > 60 {
        title.push('…');
    }
    title
}

/// Lightweight listing entry, so `list` need not return whole transcripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub model: String,
    pub message_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            model: session.model.clone(),
            message_count: session.messages.len(),
            updated_at: session.updated_at,
        }
    }
}

/// Storage backend for sessions.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert or replace a session.
    async fn save(&self, session: &Session) -> Result<(), HistoryError>;

    async fn load(&self, id: &str) -> Result<Session, HistoryError>;

    /// All sessions, most recently updated first.
    async fn list(&self) -> Result<Vec<SessionSummary>, HistoryError>;

    /// Returns `true` if a session was removed.
    async fn delete(&self, id: &str) -> Result<bool, HistoryError>;

    /// A human-readable name for this backend.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_user_message_titles_the_session() {
        let mut session = Session::new("ollama", "qwen2.5-coder");
        session.push(Message::system("be helpful"));
        assert!(session.title.is_empty());
        session.push(Message::user("Refactor the parser\nand add tests"));
        session.push(Message::user("another prompt"));
        assert_eq!(session.title, "Refactor the parser");
        assert_eq!(session.messages.len(), 3);
    }

    #[test]
    fn long_titles_are_shortened() {
        let mut session = Session::new("openai", "gpt-4o");
        session.push(Message::user("x".repeat(200)));
        assert_eq!(session.title.chars().count(), 61);
        assert!(session.title.ends_with('…'));
    }

    #[test]
    fn summary_counts_messages() {
        let mut session = Session::new("openai", "gpt-4o");
        session.push(Message::user("hi"));
        session.push(Message::assistant("hello"));
        let summary = SessionSummary::from(&session);
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.id, session.id);
    }
}
