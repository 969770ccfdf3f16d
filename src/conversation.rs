//! Conversation log.
//!
//! An ordered, append-only sequence of turns. The session controller is the
//! only writer; renderers and the mood engine read snapshots.

use crate::emotion::Emotion;
use crate::service::ChatReply;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn in the conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    emotion: Option<Emotion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_crisis: Option<bool>,
    /// Set when the turn is created, never taken from the service.
    timestamp: DateTime<Utc>,
}

impl Message {
    /// A user turn stamped now.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            emotion: None,
            confidence: None,
            is_crisis: None,
            timestamp: Utc::now(),
        }
    }

    /// An assistant turn built from a service reply, stamped now.
    #[must_use]
    pub fn assistant(reply: &ChatReply) -> Self {
        Self {
            role: Role::Assistant,
            content: reply.text.clone(),
            emotion: reply.emotion.as_deref().map(Emotion::from_label),
            confidence: reply.confidence,
            is_crisis: reply.is_crisis,
            timestamp: Utc::now(),
        }
    }

    /// An assistant turn with no annotations, used when the service failed.
    #[must_use]
    pub fn fallback(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            emotion: None,
            confidence: None,
            is_crisis: None,
            timestamp: Utc::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn emotion(&self) -> Option<Emotion> {
        self.emotion
    }

    pub fn confidence(&self) -> Option<f32> {
        self.confidence
    }

    /// Whether the service flagged the reply as needing heightened treatment.
    pub fn is_crisis(&self) -> bool {
        self.is_crisis.unwrap_or(false)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Append-only ordered log of turns.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    /// Turns in insertion order (oldest first).
    messages: Vec<Message>,
}

impl ConversationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn, returning its index.
    pub(crate) fn append(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// All turns, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    /// Most recent turn.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
