//! Conversation message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::memory::core::ids::{ConversationId, MessageId};
use crate::memory::embedding::vector::Embedding;

/// Author of a stored message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

impl Role {
    /// Stable string form for storage and prompt rendering.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(value.to_string()),
        }
    }
}

/// A persisted conversation turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier; ordering by id is turn order.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Author of the turn.
    pub role: Role,
    /// Verbatim content.
    pub content: String,
    /// Store-assigned creation time.
    pub created_at: DateTime<Utc>,
    /// Embedding computed at persistence time.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embedding: Option<Embedding>,
}

/// A message about to be appended to the store.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMessage {
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Author of the turn.
    pub role: Role,
    /// Verbatim content.
    pub content: String,
    /// Optional embedding; absent only as a degraded fallback.
    pub embedding: Option<Embedding>,
}

impl NewMessage {
    /// Build a user message.
    #[must_use]
    pub fn user(
        conversation_id: ConversationId,
        content: impl Into<String>,
        embedding: Option<Embedding>,
    ) -> Self {
        Self {
            conversation_id,
            role: Role::User,
            content: content.into(),
            embedding,
        }
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(
        conversation_id: ConversationId,
        content: impl Into<String>,
        embedding: Option<Embedding>,
    ) -> Self {
        Self {
            conversation_id,
            role: Role::Assistant,
            content: content.into(),
            embedding,
        }
    }
}

/// Similarity search hit with its distance to the query vector.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedMessage {
    /// Euclidean distance to the query embedding (lower is closer).
    pub distance: f64,
    /// Retrieved message.
    pub message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::User, Role::Assistant] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert_eq!("system".parse::<Role>(), Err("system".to_string()));
    }

    #[test]
    fn test_role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::Assistant).unwrap_or_default();
        assert_eq!(json, "\"assistant\"");
    }
}
