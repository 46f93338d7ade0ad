//! Error types for the memory subsystem.

use thiserror::Error;

use crate::memory::core::ids::ConversationId;
use crate::memory::embedding::embedder::EmbeddingError;

/// Memory subsystem error type.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The referenced conversation does not exist.
    #[error("unknown conversation: {0}")]
    UnknownConversation(ConversationId),
    /// A stored row could not be turned back into a message.
    #[error("invalid stored record: {0}")]
    InvalidRecord(String),
    /// `SQLite` storage error, raised inside a connection call.
    #[error("sqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// Convenience result alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
