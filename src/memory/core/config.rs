//! Configuration for the chat service.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::ConversationId;

/// Default Ollama API endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Top-level configuration for the chat service.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Embedding model settings.
    pub embedding: EmbeddingConfig,
    /// Generation model settings.
    pub llm: LlmConfig,
    /// Prompt assembly settings.
    pub context: ContextConfig,
    /// Streaming settings.
    pub stream: StreamConfig,
}

impl ChatConfig {
    /// Build a configuration from the process environment over the defaults.
    ///
    /// # Errors
    /// Returns an error if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> MemoryResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup over the defaults.
    ///
    /// Recognized keys: `RAGCHAT_PORT`, `RAGCHAT_DB_PATH`, `RAGCHAT_OLLAMA_URL`,
    /// `RAGCHAT_CHAT_MODEL`, `RAGCHAT_EMBEDDING_MODEL`, `RAGCHAT_EMBEDDING_DIMS`,
    /// `RAGCHAT_RECENT_LIMIT`, `RAGCHAT_RAG_LIMIT`, `RAGCHAT_HEARTBEAT_SECS`.
    ///
    /// # Errors
    /// Returns an error if a variable cannot be parsed or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> MemoryResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = parse_var(&lookup, "RAGCHAT_PORT")? {
            config.server.port = port;
        }
        if let Some(path) = lookup("RAGCHAT_DB_PATH") {
            config.storage.sqlite_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("RAGCHAT_OLLAMA_URL") {
            config.embedding.base_url.clone_from(&url);
            config.llm.base_url = url;
        }
        if let Some(model) = lookup("RAGCHAT_CHAT_MODEL") {
            config.llm.model = model;
        }
        if let Some(model) = lookup("RAGCHAT_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Some(ndims) = parse_var(&lookup, "RAGCHAT_EMBEDDING_DIMS")? {
            config.embedding.ndims = ndims;
        }
        if let Some(limit) = parse_var(&lookup, "RAGCHAT_RECENT_LIMIT")? {
            config.context.recent_limit = limit;
        }
        if let Some(limit) = parse_var(&lookup, "RAGCHAT_RAG_LIMIT")? {
            config.context.rag_limit = limit;
        }
        if let Some(secs) = parse_var(&lookup, "RAGCHAT_HEARTBEAT_SECS")? {
            config.stream.heartbeat_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> MemoryResult<()> {
        if self.embedding.ndims == 0 {
            return Err(MemoryError::InvalidConfig(
                "embedding.ndims must be > 0".to_string(),
            ));
        }

        if self.embedding.timeout_secs == 0 {
            return Err(MemoryError::InvalidConfig(
                "embedding.timeout_secs must be > 0".to_string(),
            ));
        }

        if self.embedding.model.trim().is_empty() {
            return Err(MemoryError::InvalidConfig(
                "embedding.model must not be empty".to_string(),
            ));
        }

        if self.llm.model.trim().is_empty() {
            return Err(MemoryError::InvalidConfig(
                "llm.model must not be empty".to_string(),
            ));
        }

        if self.stream.heartbeat_secs == 0 {
            return Err(MemoryError::InvalidConfig(
                "stream.heartbeat_secs must be > 0".to_string(),
            ));
        }

        if self.stream.channel_capacity == 0 {
            return Err(MemoryError::InvalidConfig(
                "stream.channel_capacity must be > 0".to_string(),
            ));
        }

        if self.stream.default_conversation_id.get() <= 0 {
            return Err(MemoryError::InvalidConfig(
                "stream.default_conversation_id must be > 0".to_string(),
            ));
        }

        Url::parse(&self.embedding.base_url)?;
        Url::parse(&self.llm.base_url)?;

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> MemoryResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|err| MemoryError::InvalidConfig(format!("{key}={raw}: {err}")))
        })
        .transpose()
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 4000 }
    }
}

/// Storage configuration for conversations and messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Conversation table name.
    pub conversations_table: String,
    /// Message table name.
    pub messages_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("ragchat.sqlite"),
            conversations_table: "conversations".to_string(),
            messages_table: "chat_messages".to_string(),
        }
    }
}

/// Embedding model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Ollama base URL.
    pub base_url: String,
    /// Ollama embedding model name.
    pub model: String,
    /// Embedding vector dimensions.
    pub ndims: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Ask the backend to shorten over-length input instead of rejecting it.
    pub truncate: bool,
}

impl EmbeddingConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: "nomic-embed-text".to_string(),
            ndims: 768,
            timeout_secs: 15,
            truncate: true,
        }
    }
}

/// Generation model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama base URL.
    pub base_url: String,
    /// Ollama generation model name.
    pub model: String,
    /// Connection timeout in seconds. Generation itself is unbounded.
    pub connect_timeout_secs: u64,
}

impl LlmConfig {
    /// Connection timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: "deepseek-r1:14b".to_string(),
            connect_timeout_secs: 5,
        }
    }
}

/// Prompt assembly settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Number of most recent messages included verbatim.
    pub recent_limit: usize,
    /// Number of similarity-retrieved messages included.
    pub rag_limit: usize,
    /// Render the retrieved section before the short-term section.
    pub relevant_first: bool,
    /// Instruction line placed at the top of every prompt; empty disables it.
    pub preamble: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            recent_limit: 10,
            rag_limit: 3,
            relevant_first: false,
            preamble: "You are a chat assistant. Answer the user message using the recent \
                       conversation and the relevant earlier context below."
                .to_string(),
        }
    }
}

/// Streaming settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Idle interval after which a heartbeat comment is pushed.
    pub heartbeat_secs: u64,
    /// Buffered events between the turn task and the client transport.
    pub channel_capacity: usize,
    /// Conversation used when a request names none.
    pub default_conversation_id: ConversationId,
}

impl StreamConfig {
    /// Heartbeat interval as a [`Duration`].
    #[must_use]
    pub const fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 10,
            channel_capacity: 64,
            default_conversation_id: ConversationId::new(1),
        }
    }
}
