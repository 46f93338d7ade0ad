//! Shared fakes for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use futures::stream;
use tokio::net::TcpListener;

use crate::llm::ollama_stream::{FragmentStream, GenerationError, Generator};
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::{ConversationId, MessageId};
use crate::memory::core::message::{Message, NewMessage, RankedMessage, Role};
use crate::memory::embedding::embedder::{EmbedFuture, Embedder, EmbeddingError};
use crate::memory::embedding::vector::Embedding;
use crate::memory::storage::in_memory_store::InMemoryMessageStore;
use crate::memory::storage::message_store::{MessageStore, StoreFuture};

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_backend(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve test backend");
    });
    format!("http://{addr}")
}

/// Base URL of a local port with nothing listening on it.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

/// Embedder whose backend is always down.
pub struct FailingEmbedder {
    ndims: usize,
}

impl FailingEmbedder {
    pub const fn new(ndims: usize) -> Self {
        Self { ndims }
    }
}

impl Embedder for FailingEmbedder {
    fn embed_text(&self, _text: &str) -> EmbedFuture<'_, Result<Embedding, EmbeddingError>> {
        Box::pin(async { Err(EmbeddingError::Status(503)) })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }
}

/// Embedder returning the same vector for every input.
pub struct FixedEmbedder {
    vec: Vec<f32>,
}

impl FixedEmbedder {
    pub const fn new(vec: Vec<f32>) -> Self {
        Self { vec }
    }
}

impl Embedder for FixedEmbedder {
    fn embed_text(&self, _text: &str) -> EmbedFuture<'_, Result<Embedding, EmbeddingError>> {
        let embedding = Embedding::new(self.vec.clone());
        Box::pin(async move { Ok(embedding) })
    }

    fn ndims(&self) -> usize {
        self.vec.len()
    }
}

/// One step of a scripted generation.
#[derive(Clone, Debug)]
pub enum Step {
    /// Emit a fragment.
    Fragment(&'static str),
    /// Wait before the next step.
    Pause(Duration),
    /// End with a read failure.
    Fail(&'static str),
    /// Never produce anything else.
    Hang,
}

/// Generator replaying a fixed script and recording the prompts it saw.
pub struct ScriptedGenerator {
    script: Vec<Step>,
    prompts: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn fragments(parts: &[&'static str]) -> Self {
        Self::new(parts.iter().copied().map(Step::Fragment).collect())
    }

    /// `(model, prompt)` pairs received so far.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

impl Generator for ScriptedGenerator {
    fn stream(&self, model: &str, prompt: &str) -> FragmentStream {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push((model.to_string(), prompt.to_string()));

        let steps = self.script.clone().into_iter();
        Box::pin(stream::unfold(Some(steps), |steps| async move {
            let mut steps = steps?;
            loop {
                match steps.next()? {
                    Step::Fragment(text) => return Some((Ok(text.to_string()), Some(steps))),
                    Step::Pause(duration) => tokio::time::sleep(duration).await,
                    Step::Fail(message) => {
                        return Some((Err(GenerationError::Read(message.to_string())), None));
                    }
                    Step::Hang => std::future::pending::<()>().await,
                }
            }
        }))
    }
}

/// In-memory store that fails selected operations.
#[derive(Default)]
pub struct FaultyStore {
    inner: InMemoryMessageStore,
    failing_append: Option<Role>,
    failing_recent: bool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject appends of messages with `role`.
    pub fn failing_append(mut self, role: Role) -> Self {
        self.failing_append = Some(role);
        self
    }

    /// Reject every `recent_messages` call.
    pub fn failing_recent(mut self) -> Self {
        self.failing_recent = true;
        self
    }

    /// Messages actually stored, bypassing injected failures.
    pub async fn stored(&self, id: ConversationId) -> Vec<Message> {
        self.inner.list_messages(id).await.expect("list messages")
    }
}

fn offline() -> MemoryError {
    MemoryError::InvalidRecord("store offline".to_string())
}

impl MessageStore for FaultyStore {
    fn conversation_exists(&self, id: ConversationId) -> StoreFuture<'_, MemoryResult<bool>> {
        self.inner.conversation_exists(id)
    }

    fn create_conversation(
        &self,
        owner: Option<String>,
    ) -> StoreFuture<'_, MemoryResult<ConversationId>> {
        self.inner.create_conversation(owner)
    }

    fn append_message(&self, message: NewMessage) -> StoreFuture<'_, MemoryResult<MessageId>> {
        if self.failing_append == Some(message.role) {
            return Box::pin(async { Err(offline()) });
        }
        self.inner.append_message(message)
    }

    fn recent_messages(
        &self,
        id: ConversationId,
        limit: usize,
    ) -> StoreFuture<'_, MemoryResult<Vec<Message>>> {
        if self.failing_recent {
            return Box::pin(async { Err(offline()) });
        }
        self.inner.recent_messages(id, limit)
    }

    fn similar_messages<'a>(
        &'a self,
        id: ConversationId,
        query: &'a Embedding,
        top_n: usize,
    ) -> StoreFuture<'a, MemoryResult<Vec<RankedMessage>>> {
        self.inner.similar_messages(id, query, top_n)
    }

    fn list_messages(&self, id: ConversationId) -> StoreFuture<'_, MemoryResult<Vec<Message>>> {
        self.inner.list_messages(id)
    }
}
