//! Context assembly: short-term window plus similarity retrieval.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::memory::core::config::ContextConfig;
use crate::memory::core::errors::MemoryResult;
use crate::memory::core::ids::ConversationId;
use crate::memory::core::message::{Message, RankedMessage};
use crate::memory::embedding::embedder::FallbackEmbedder;
use crate::memory::embedding::vector::Embedding;
use crate::memory::prompt::prompt_builder::{PromptParts, build_prompt_block};
use crate::memory::storage::message_store::MessageStore;

/// Prompt assembled for one turn.
#[derive(Clone, Debug)]
pub struct AssembledPrompt {
    /// Prompt text sent to the generation backend.
    pub text: String,
    /// Short-term messages used, oldest first.
    pub short_term: Vec<Message>,
    /// Retrieved messages used, nearest first.
    pub relevant: Vec<RankedMessage>,
    /// Whether similarity retrieval failed and was left out.
    pub degraded: bool,
}

/// Builds generation prompts from stored conversation history.
pub struct ContextAssembler {
    store: Arc<dyn MessageStore>,
    embedder: FallbackEmbedder,
    preamble: String,
    relevant_first: bool,
}

impl ContextAssembler {
    /// Create an assembler over a store and an embedder.
    #[must_use]
    pub fn new(
        store: Arc<dyn MessageStore>,
        embedder: FallbackEmbedder,
        config: &ContextConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            preamble: config.preamble.clone(),
            relevant_first: config.relevant_first,
        }
    }

    /// Assemble the prompt for `user_query`, embedding the query first.
    ///
    /// # Errors
    /// Returns an error if the short-term window cannot be loaded.
    pub async fn build_prompt(
        &self,
        conversation_id: ConversationId,
        user_query: &str,
        recent_limit: usize,
        rag_limit: usize,
    ) -> MemoryResult<AssembledPrompt> {
        let query_embedding = self.embedder.embed_or_zero(user_query).await;
        self.build_prompt_with_embedding(
            conversation_id,
            user_query,
            &query_embedding,
            recent_limit,
            rag_limit,
        )
        .await
    }

    /// Assemble the prompt with a query embedding computed by the caller.
    ///
    /// A failed similarity lookup degrades to the short-term-only prompt.
    ///
    /// # Errors
    /// Returns an error if the short-term window cannot be loaded.
    pub async fn build_prompt_with_embedding(
        &self,
        conversation_id: ConversationId,
        user_query: &str,
        query_embedding: &Embedding,
        recent_limit: usize,
        rag_limit: usize,
    ) -> MemoryResult<AssembledPrompt> {
        let short_term = self
            .store
            .recent_messages(conversation_id, recent_limit)
            .await?;

        let (relevant, degraded) = match self
            .store
            .similar_messages(conversation_id, query_embedding, rag_limit)
            .await
        {
            Ok(relevant) => (relevant, false),
            Err(err) => {
                warn!(
                    conversation_id = %conversation_id,
                    error = %err,
                    "similarity retrieval failed; using short-term context only"
                );
                (Vec::new(), true)
            }
        };

        let parts = PromptParts {
            preamble: self.preamble.clone(),
            short_term,
            relevant: relevant.iter().map(|hit| hit.message.clone()).collect(),
            user_message: user_query.to_string(),
            relevant_first: self.relevant_first,
        };
        let text = build_prompt_block(&parts);

        debug!(
            conversation_id = %conversation_id,
            short_term = parts.short_term.len(),
            relevant = relevant.len(),
            degraded,
            "assembled prompt"
        );

        Ok(AssembledPrompt {
            text,
            short_term: parts.short_term,
            relevant,
            degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::errors::MemoryError;
    use crate::memory::core::ids::MessageId;
    use crate::memory::core::message::NewMessage;
    use crate::memory::storage::in_memory_store::InMemoryMessageStore;
    use crate::memory::storage::message_store::StoreFuture;
    use crate::test_support::{FailingEmbedder, FixedEmbedder};

    fn assembler(store: Arc<dyn MessageStore>, preamble: &str) -> ContextAssembler {
        let config = ContextConfig {
            preamble: preamble.to_string(),
            ..ContextConfig::default()
        };
        let embedder = FallbackEmbedder::new(Arc::new(FixedEmbedder::new(vec![1.0, 0.0])));
        ContextAssembler::new(store, embedder, &config)
    }

    async fn seeded_store() -> (Arc<InMemoryMessageStore>, ConversationId) {
        let store = Arc::new(InMemoryMessageStore::new());
        let Ok(id) = store.create_conversation(None).await else {
            panic!("create conversation");
        };
        let rows = [
            ("user", "I like Go.", vec![1.0, 0.0]),
            ("assistant", "Noted.", vec![0.0, 1.0]),
            ("user", "What is Rust?", vec![0.0, 1.0]),
            ("assistant", "A language.", vec![0.0, 1.0]),
        ];
        for (role, content, vec) in rows {
            let embedding = Some(Embedding::new(vec));
            let message = if role == "user" {
                NewMessage::user(id, content, embedding)
            } else {
                NewMessage::assistant(id, content, embedding)
            };
            assert!(store.append_message(message).await.is_ok());
        }
        (store, id)
    }

    #[tokio::test]
    async fn test_build_prompt_combines_windows() {
        let (store, id) = seeded_store().await;
        let assembler = assembler(store, "");

        let Ok(prompt) = assembler.build_prompt(id, "Compare them", 2, 1).await else {
            panic!("prompt should build");
        };
        assert!(!prompt.degraded);
        assert_eq!(
            prompt.text,
            "[SHORT_TERM]\nuser: What is Rust?\nassistant: A language.\n\n\
             [MEMORY_RELEVANT]\nuser: I like Go.\n\n\
             [USER_MESSAGE]\nUser: Compare them\nAssistant:"
        );
        assert_eq!(prompt.relevant.len(), 1);
        assert!(prompt.relevant[0].distance.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_conversation_yields_query_block_only() {
        let store = Arc::new(InMemoryMessageStore::new());
        let Ok(id) = store.create_conversation(None).await else {
            panic!("create conversation");
        };
        let assembler = assembler(store, "Be helpful.");

        let prompt = assembler.build_prompt(id, "hello", 10, 3).await;
        assert_eq!(
            prompt.map(|p| p.text).ok(),
            Some("Be helpful.\n\n[USER_MESSAGE]\nUser: hello\nAssistant:".to_string())
        );
    }

    #[tokio::test]
    async fn test_zero_limits_yield_empty_sections() {
        let (store, id) = seeded_store().await;
        let assembler = assembler(store, "");

        let Ok(prompt) = assembler.build_prompt(id, "q", 0, 0).await else {
            panic!("prompt should build");
        };
        assert!(prompt.short_term.is_empty());
        assert!(prompt.relevant.is_empty());
        assert_eq!(prompt.text, "[USER_MESSAGE]\nUser: q\nAssistant:");
    }

    #[tokio::test]
    async fn test_embedding_failure_still_builds_prompt() {
        let (store, id) = seeded_store().await;
        let embedder = FallbackEmbedder::new(Arc::new(FailingEmbedder::new(2)));
        let assembler = ContextAssembler::new(store, embedder, &ContextConfig::default());

        let Ok(prompt) = assembler.build_prompt(id, "q", 10, 3).await else {
            panic!("prompt should build");
        };
        // The zero vector still ranks messages; the turn is not degraded.
        assert!(!prompt.degraded);
        assert_eq!(prompt.relevant.len(), 3);
        assert_eq!(prompt.short_term.len(), 4);
    }

    struct SimilarityDown(InMemoryMessageStore);

    impl MessageStore for SimilarityDown {
        fn conversation_exists(&self, id: ConversationId) -> StoreFuture<'_, MemoryResult<bool>> {
            self.0.conversation_exists(id)
        }

        fn create_conversation(
            &self,
            owner: Option<String>,
        ) -> StoreFuture<'_, MemoryResult<ConversationId>> {
            self.0.create_conversation(owner)
        }

        fn append_message(&self, message: NewMessage) -> StoreFuture<'_, MemoryResult<MessageId>> {
            self.0.append_message(message)
        }

        fn recent_messages(
            &self,
            id: ConversationId,
            limit: usize,
        ) -> StoreFuture<'_, MemoryResult<Vec<Message>>> {
            self.0.recent_messages(id, limit)
        }

        fn similar_messages<'a>(
            &'a self,
            _id: ConversationId,
            _query: &'a Embedding,
            _top_n: usize,
        ) -> StoreFuture<'a, MemoryResult<Vec<RankedMessage>>> {
            Box::pin(async { Err(MemoryError::InvalidRecord("index offline".to_string())) })
        }

        fn list_messages(&self, id: ConversationId) -> StoreFuture<'_, MemoryResult<Vec<Message>>> {
            self.0.list_messages(id)
        }
    }

    #[tokio::test]
    async fn test_similarity_failure_degrades_to_short_term() {
        let inner = InMemoryMessageStore::new();
        let Ok(id) = inner.create_conversation(None).await else {
            panic!("create conversation");
        };
        assert!(inner.append_message(NewMessage::user(id, "earlier", None)).await.is_ok());
        let assembler = assembler(Arc::new(SimilarityDown(inner)), "");

        let Ok(prompt) = assembler.build_prompt(id, "now", 10, 3).await else {
            panic!("prompt should build");
        };
        assert!(prompt.degraded);
        assert_eq!(
            prompt.text,
            "[SHORT_TERM]\nuser: earlier\n\n[USER_MESSAGE]\nUser: now\nAssistant:"
        );
    }
}
