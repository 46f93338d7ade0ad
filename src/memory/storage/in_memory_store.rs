//! In-process message store for tests and ephemeral deployments.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use dashmap::DashMap;

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::{ConversationId, MessageId};
use crate::memory::core::message::{Message, NewMessage, RankedMessage};
use crate::memory::embedding::vector::Embedding;
use crate::memory::storage::message_store::{MessageStore, StoreFuture};

/// [`MessageStore`] kept entirely in memory.
///
/// Identifier allocation mirrors the `SQLite` store: both conversation and
/// message ids start at 1 and never repeat. Owners are not retained.
pub struct InMemoryMessageStore {
    conversations: DashMap<ConversationId, Vec<Message>>,
    next_conversation: AtomicI64,
    next_message: AtomicI64,
}

impl InMemoryMessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            conversations: DashMap::new(),
            next_conversation: AtomicI64::new(1),
            next_message: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn conversation_exists(&self, id: ConversationId) -> StoreFuture<'_, MemoryResult<bool>> {
        Box::pin(async move { Ok(self.conversations.contains_key(&id)) })
    }

    fn create_conversation(
        &self,
        _owner: Option<String>,
    ) -> StoreFuture<'_, MemoryResult<ConversationId>> {
        Box::pin(async move {
            let id = ConversationId::new(self.next_conversation.fetch_add(1, Ordering::SeqCst));
            self.conversations.insert(id, Vec::new());
            Ok(id)
        })
    }

    fn append_message(&self, message: NewMessage) -> StoreFuture<'_, MemoryResult<MessageId>> {
        Box::pin(async move {
            let Some(mut messages) = self.conversations.get_mut(&message.conversation_id) else {
                return Err(MemoryError::UnknownConversation(message.conversation_id));
            };

            // Allocated under the entry lock so ids stay ordered per conversation.
            let id = MessageId::new(self.next_message.fetch_add(1, Ordering::SeqCst));
            messages.push(Message {
                id,
                conversation_id: message.conversation_id,
                role: message.role,
                content: message.content,
                created_at: Utc::now(),
                embedding: message.embedding,
            });
            Ok(id)
        })
    }

    fn recent_messages(
        &self,
        id: ConversationId,
        limit: usize,
    ) -> StoreFuture<'_, MemoryResult<Vec<Message>>> {
        Box::pin(async move {
            let Some(messages) = self.conversations.get(&id) else {
                return Ok(Vec::new());
            };
            let start = messages.len().saturating_sub(limit);
            Ok(messages[start..].to_vec())
        })
    }

    fn similar_messages<'a>(
        &'a self,
        id: ConversationId,
        query: &'a Embedding,
        top_n: usize,
    ) -> StoreFuture<'a, MemoryResult<Vec<RankedMessage>>> {
        Box::pin(async move {
            if top_n == 0 || query.ndims() == 0 {
                return Ok(Vec::new());
            }
            let Some(messages) = self.conversations.get(&id) else {
                return Ok(Vec::new());
            };

            let mut ranked: Vec<RankedMessage> = messages
                .iter()
                .filter_map(|message| {
                    let distance = message.embedding.as_ref()?.l2_distance(query)?;
                    Some(RankedMessage {
                        distance,
                        message: message.clone(),
                    })
                })
                .collect();
            drop(messages);

            ranked.sort_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then_with(|| a.message.id.cmp(&b.message.id))
            });
            ranked.truncate(top_n);
            Ok(ranked)
        })
    }

    fn list_messages(&self, id: ConversationId) -> StoreFuture<'_, MemoryResult<Vec<Message>>> {
        Box::pin(async move {
            Ok(self
                .conversations
                .get(&id)
                .map(|messages| messages.value().clone())
                .unwrap_or_default())
        })
    }
}
