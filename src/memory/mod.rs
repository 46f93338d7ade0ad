//! Conversation memory for the chat service.
//!
//! - `core`: configuration, errors, identifiers and message records
//! - `embedding`: embedding backend abstraction, Ollama client and vectors
//! - `storage`: message stores (`SQLite` with sqlite-vec, in-memory)
//! - `prompt`: deterministic prompt rendering
//! - `engine`: context assembly from recent and similar messages

pub mod core;
pub mod embedding;
pub mod engine;
pub mod prompt;
pub mod storage;

pub use self::core::{
    ChatConfig, ContextConfig, ConversationId, EmbeddingConfig, LlmConfig, MemoryError,
    MemoryResult, Message, MessageId, NewMessage, RankedMessage, Role, ServerConfig,
    StorageConfig, StreamConfig, TurnId,
};
pub use embedding::{EmbedFuture, Embedder, Embedding, EmbeddingError, FallbackEmbedder, OllamaEmbedder};
pub use engine::{AssembledPrompt, ContextAssembler};
pub use prompt::{PromptParts, build_prompt_block, build_transcript_prompt};
pub use storage::{
    InMemoryMessageStore, MessageStore, SqliteMessageStore, StoreFuture, init_sqlite_vec_extension,
};
