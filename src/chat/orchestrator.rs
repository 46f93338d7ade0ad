//! Turn orchestration: user persistence, prompt assembly, stream fan-in and
//! assistant persistence.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::chat::events::StreamEvent;
use crate::chat::request::TurnRequest;
use crate::llm::ollama_stream::{FragmentStream, Generator, OllamaGenerator};
use crate::memory::core::config::ChatConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::{ConversationId, MessageId, TurnId};
use crate::memory::core::message::NewMessage;
use crate::memory::embedding::embedder::{Embedder, FallbackEmbedder, OllamaEmbedder};
use crate::memory::engine::assembler::ContextAssembler;
use crate::memory::prompt::prompt_builder::build_transcript_prompt;
use crate::memory::storage::message_store::MessageStore;
use crate::memory::storage::sqlite_store::SqliteMessageStore;

/// Lifecycle of one chat turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnPhase {
    /// Checking the inbound request.
    Validating,
    /// Recording the user message.
    PersistingUserTurn,
    /// Assembling the generation prompt.
    BuildingPrompt,
    /// Relaying backend output to the client.
    Streaming,
    /// Recording the assistant message.
    PersistingAssistantTurn,
    /// Finished after a normal backend completion.
    Done,
    /// Finished after a backend failure or client disconnect.
    Aborted,
}

impl TurnPhase {
    /// Stable name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::PersistingUserTurn => "persisting_user_turn",
            Self::BuildingPrompt => "building_prompt",
            Self::Streaming => "streaming",
            Self::PersistingAssistantTurn => "persisting_assistant_turn",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported before any event is streamed.
#[derive(Debug, Error)]
pub enum TurnError {
    /// The request was rejected; nothing was stored.
    #[error("{0}")]
    BadRequest(String),
    /// A storage step failed before streaming began.
    #[error("{phase} failed: {message}")]
    Internal {
        /// Phase that failed.
        phase: TurnPhase,
        /// Error description.
        message: String,
    },
}

impl TurnError {
    /// HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Internal { .. } => 500,
        }
    }

    /// Phase in which the turn stopped.
    #[must_use]
    pub const fn phase(&self) -> TurnPhase {
        match self {
            Self::BadRequest(_) => TurnPhase::Validating,
            Self::Internal { phase, .. } => *phase,
        }
    }

    fn internal(phase: TurnPhase, err: &MemoryError) -> Self {
        Self::Internal {
            phase,
            message: err.to_string(),
        }
    }
}

/// Why the streaming loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamExit {
    /// The backend finished normally.
    Completed,
    /// The backend failed; the message was sent to the client.
    BackendFailed(String),
    /// The client went away.
    ClientGone,
}

/// A turn whose user message is stored and whose prompt is ready.
#[derive(Clone, Debug)]
pub struct PreparedTurn {
    /// Log correlation id.
    pub turn_id: TurnId,
    /// Conversation actually used, possibly newly created.
    pub conversation_id: ConversationId,
    /// Stored user message.
    pub user_message_id: MessageId,
    /// Prompt to send to the backend.
    pub prompt: String,
    /// Whether the prompt is the raw transcript because assembly failed.
    pub fallback_prompt: bool,
}

/// Result of a streamed turn.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    /// Conversation the turn belongs to.
    pub conversation_id: ConversationId,
    /// Concatenation of every forwarded fragment.
    pub assistant_text: String,
    /// Stored assistant message, if any text was produced and stored.
    pub assistant_message_id: Option<MessageId>,
    /// How the streaming loop ended.
    pub exit: StreamExit,
    /// Terminal phase.
    pub phase: TurnPhase,
}

/// Backend dependencies for the orchestrator.
pub struct ChatBackends {
    /// Message store implementation.
    pub store: Arc<dyn MessageStore>,
    /// Embedding backend.
    pub embedder: Arc<dyn Embedder>,
    /// Generation backend.
    pub generator: Arc<dyn Generator>,
}

impl ChatBackends {
    /// Build `SQLite` and Ollama backends from config.
    ///
    /// # Errors
    /// Returns an error if any backend cannot be initialized.
    pub async fn sqlite(config: &ChatConfig) -> MemoryResult<Self> {
        let store = Arc::new(SqliteMessageStore::new(&config.storage).await?);
        let embedder = Arc::new(OllamaEmbedder::new(&config.embedding)?);
        let generator = Arc::new(OllamaGenerator::new(&config.llm)?);

        Ok(Self {
            store,
            embedder,
            generator,
        })
    }
}

/// Drives chat turns from request to stored reply.
pub struct ChatOrchestrator {
    config: ChatConfig,
    store: Arc<dyn MessageStore>,
    embedder: FallbackEmbedder,
    generator: Arc<dyn Generator>,
    assembler: ContextAssembler,
}

impl ChatOrchestrator {
    /// Create an orchestrator.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ChatConfig, backends: ChatBackends) -> MemoryResult<Self> {
        config.validate()?;
        let embedder = FallbackEmbedder::new(backends.embedder);
        let assembler =
            ContextAssembler::new(Arc::clone(&backends.store), embedder.clone(), &config.context);

        Ok(Self {
            config,
            store: backends.store,
            embedder,
            generator: backends.generator,
            assembler,
        })
    }

    /// Create an orchestrator over `SQLite` and Ollama backends.
    ///
    /// # Errors
    /// Returns an error if backends cannot be initialized.
    pub async fn from_config(config: ChatConfig) -> MemoryResult<Self> {
        let backends = ChatBackends::sqlite(&config).await?;
        Self::new(config, backends)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Shared message store.
    #[must_use]
    pub const fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Store the user message and build the prompt.
    ///
    /// Nothing has been streamed when this returns.
    ///
    /// # Errors
    /// Returns [`TurnError::Internal`] if the conversation cannot be resolved
    /// or the user message cannot be stored.
    pub async fn begin_turn(&self, request: TurnRequest) -> Result<PreparedTurn, TurnError> {
        let turn_id = TurnId::new();
        let span = info_span!(
            "chat_turn",
            turn_id = %turn_id,
            conversation_id = %request.conversation_id
        );
        self.prepare(turn_id, request).instrument(span).await
    }

    /// Relay the backend stream to `sink`, then store the assistant message.
    ///
    /// The sender is dropped when this returns, which closes the client
    /// stream.
    pub async fn stream_turn(
        &self,
        turn: PreparedTurn,
        sink: mpsc::Sender<StreamEvent>,
    ) -> TurnOutcome {
        let span = info_span!(
            "chat_turn",
            turn_id = %turn.turn_id,
            conversation_id = %turn.conversation_id
        );
        self.relay(turn, sink).instrument(span).await
    }

    /// Run a whole turn.
    ///
    /// # Errors
    /// Returns an error if the turn fails before streaming begins.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        sink: mpsc::Sender<StreamEvent>,
    ) -> Result<TurnOutcome, TurnError> {
        let turn = self.begin_turn(request).await?;
        Ok(self.stream_turn(turn, sink).await)
    }

    async fn prepare(
        &self,
        turn_id: TurnId,
        request: TurnRequest,
    ) -> Result<PreparedTurn, TurnError> {
        debug!(phase = %TurnPhase::PersistingUserTurn, "turn phase");
        let conversation_id = self.resolve_conversation(request.conversation_id).await?;

        let user_message = request.user_message();
        let embedding = self.embedder.embed_or_zero(user_message).await;
        if embedding.is_zero() {
            debug!("user message stored with a zero embedding; retrieval is degraded");
        }
        let user_message_id = self
            .store
            .append_message(NewMessage::user(
                conversation_id,
                user_message,
                Some(embedding.clone()),
            ))
            .await
            .map_err(|err| TurnError::internal(TurnPhase::PersistingUserTurn, &err))?;

        debug!(phase = %TurnPhase::BuildingPrompt, "turn phase");
        let context = &self.config.context;
        let (prompt, fallback_prompt) = match self
            .assembler
            .build_prompt_with_embedding(
                conversation_id,
                user_message,
                &embedding,
                context.recent_limit,
                context.rag_limit,
            )
            .await
        {
            Ok(assembled) => (assembled.text, false),
            Err(err) => {
                warn!(error = %err, "context assembly failed; using raw transcript");
                let entries = request
                    .transcript
                    .iter()
                    .map(|entry| (entry.role.as_str(), entry.content.as_str()));
                (build_transcript_prompt(entries), true)
            }
        };

        Ok(PreparedTurn {
            turn_id,
            conversation_id,
            user_message_id,
            prompt,
            fallback_prompt,
        })
    }

    async fn resolve_conversation(
        &self,
        requested: ConversationId,
    ) -> Result<ConversationId, TurnError> {
        let exists = self
            .store
            .conversation_exists(requested)
            .await
            .map_err(|err| TurnError::internal(TurnPhase::PersistingUserTurn, &err))?;
        if exists {
            return Ok(requested);
        }

        let created = self
            .store
            .create_conversation(None)
            .await
            .map_err(|err| TurnError::internal(TurnPhase::PersistingUserTurn, &err))?;
        tracing::Span::current().record("conversation_id", tracing::field::display(created));
        info!(requested = %requested, created = %created, "created conversation for unknown id");
        Ok(created)
    }

    async fn relay(&self, turn: PreparedTurn, sink: mpsc::Sender<StreamEvent>) -> TurnOutcome {
        debug!(phase = %TurnPhase::Streaming, fallback_prompt = turn.fallback_prompt, "turn phase");
        let fragments = self.generator.stream(&self.config.llm.model, &turn.prompt);
        let mut assistant_text = String::new();
        let exit = self.pump(fragments, &sink, &mut assistant_text).await;

        debug!(phase = %TurnPhase::PersistingAssistantTurn, "turn phase");
        let assistant_message_id = self
            .persist_assistant(turn.conversation_id, &assistant_text)
            .await;

        let phase = if exit == StreamExit::Completed {
            TurnPhase::Done
        } else {
            TurnPhase::Aborted
        };
        info!(
            phase = %phase,
            exit = ?exit,
            chars = assistant_text.len(),
            "turn finished"
        );

        TurnOutcome {
            conversation_id: turn.conversation_id,
            assistant_text,
            assistant_message_id,
            exit,
            phase,
        }
    }

    /// Forward fragments in decode order, with idle heartbeats.
    async fn pump(
        &self,
        mut fragments: FragmentStream,
        sink: &mpsc::Sender<StreamEvent>,
        buffer: &mut String,
    ) -> StreamExit {
        let period = self.config.stream.heartbeat();
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                next = fragments.next() => match next {
                    // Keep-alive records carry no text and are not forwarded.
                    Some(Ok(fragment)) if fragment.is_empty() => {}
                    Some(Ok(fragment)) => {
                        buffer.push_str(&fragment);
                        if sink.send(StreamEvent::Fragment(fragment)).await.is_err() {
                            return StreamExit::ClientGone;
                        }
                        heartbeat.reset();
                    }
                    Some(Err(err)) => {
                        let message = err.to_string();
                        warn!(error = %message, "generation stream failed");
                        if sink.send(StreamEvent::Error(message.clone())).await.is_err() {
                            debug!("client gone before error event");
                        }
                        return StreamExit::BackendFailed(message);
                    }
                    None => {
                        if sink.send(StreamEvent::Done).await.is_err() {
                            debug!("client gone before done event");
                        }
                        return StreamExit::Completed;
                    }
                },
                _ = heartbeat.tick() => {
                    if sink.send(StreamEvent::Heartbeat).await.is_err() {
                        return StreamExit::ClientGone;
                    }
                }
                () = sink.closed() => return StreamExit::ClientGone,
            }
        }
    }

    async fn persist_assistant(&self, conversation_id: ConversationId, text: &str) -> Option<MessageId> {
        if text.is_empty() {
            return None;
        }

        let embedding = self.embedder.embed_or_zero(text).await;
        match self
            .store
            .append_message(NewMessage::assistant(conversation_id, text, Some(embedding)))
            .await
        {
            Ok(id) => Some(id),
            Err(err) => {
                error!(error = %err, "failed to store assistant message");
                None
            }
        }
    }
}
