//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::chat::orchestrator::ChatOrchestrator;
use crate::memory::core::config::ChatConfig;
use crate::memory::core::errors::MemoryResult;

/// Shared application state.
pub struct AppState {
    /// Turn orchestrator; also owns the message store handle.
    pub orchestrator: Arc<ChatOrchestrator>,
}

impl AppState {
    /// Create the state over `SQLite` and Ollama backends.
    ///
    /// # Errors
    /// Returns an error if the store or the HTTP clients cannot be created.
    pub async fn new(config: ChatConfig) -> MemoryResult<Arc<Self>> {
        let orchestrator = ChatOrchestrator::from_config(config).await?;
        Ok(Self::from_orchestrator(Arc::new(orchestrator)))
    }

    /// Wrap an existing orchestrator.
    #[must_use]
    pub fn from_orchestrator(orchestrator: Arc<ChatOrchestrator>) -> Arc<Self> {
        Arc::new(Self { orchestrator })
    }
}
