//! Conversation types shared by the session engine and its clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The originator of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A message typed by the human user.
    User,
    /// A reply produced by the assistant.
    Assistant,
}

/// One message in a session's conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who produced the message.
    pub role: Role,
    /// The message text.
    pub content: String,
    /// When the message was recorded.
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a user message stamped with the given instant.
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp,
        }
    }

    /// Create an assistant message stamped with the given instant.
    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp,
        }
    }

    /// Whether this message was produced by the user.
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}
