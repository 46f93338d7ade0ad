//! Core memory types: configuration, errors, identifiers and messages.

pub mod config;
pub mod errors;
pub mod ids;
pub mod message;

pub use config::{
    ChatConfig, ContextConfig, EmbeddingConfig, LlmConfig, ServerConfig, StorageConfig,
    StreamConfig,
};
pub use errors::{MemoryError, MemoryResult};
pub use ids::{ConversationId, MessageId, TurnId};
pub use message::{Message, NewMessage, RankedMessage, Role};
