//! Message store contract.

use std::future::Future;
use std::pin::Pin;

use crate::memory::core::errors::MemoryResult;
use crate::memory::core::ids::{ConversationId, MessageId};
use crate::memory::core::message::{Message, NewMessage, RankedMessage};
use crate::memory::embedding::vector::Embedding;

/// Boxed future type for message store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable, per-conversation ordered record of chat turns.
///
/// Implementations must be safe to share across concurrent turns. Every
/// append is atomic and returns an identifier that orders the message within
/// its conversation.
pub trait MessageStore: Send + Sync {
    /// Check if a conversation exists.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn conversation_exists(&self, id: ConversationId) -> StoreFuture<'_, MemoryResult<bool>>;

    /// Allocate a new conversation with a strictly increasing identifier.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn create_conversation(
        &self,
        owner: Option<String>,
    ) -> StoreFuture<'_, MemoryResult<ConversationId>>;

    /// Append a message and return its store-assigned identifier.
    ///
    /// # Errors
    /// Returns an error if the conversation is unknown or storage access fails.
    fn append_message(&self, message: NewMessage) -> StoreFuture<'_, MemoryResult<MessageId>>;

    /// Load the last `limit` messages of a conversation in ascending id order.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn recent_messages(
        &self,
        id: ConversationId,
        limit: usize,
    ) -> StoreFuture<'_, MemoryResult<Vec<Message>>>;

    /// Load up to `top_n` messages of a conversation closest to `query`,
    /// nearest first. Messages without a comparable embedding are skipped.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn similar_messages<'a>(
        &'a self,
        id: ConversationId,
        query: &'a Embedding,
        top_n: usize,
    ) -> StoreFuture<'a, MemoryResult<Vec<RankedMessage>>>;

    /// Load the whole conversation in ascending id order.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_messages(&self, id: ConversationId) -> StoreFuture<'_, MemoryResult<Vec<Message>>>;
}
