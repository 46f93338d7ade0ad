//! HTTP route handlers for the chat API.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::chat::events::StreamEvent;
use crate::chat::orchestrator::TurnError;
use crate::chat::request::{TranscriptEntry, TurnRequest};
use crate::memory::core::ids::{ConversationId, MessageId};
use crate::memory::core::message::{Message, Role};

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chat/stream", get(stream_from_query))
        .route("/api/chat/stream", axum::routing::post(stream_from_json))
        .route("/chat/create", get(create_conversation).post(create_conversation))
        .route("/api/conversations/{id}/messages", get(list_messages))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ragchat",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

impl IntoResponse for TurnError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.to_string()).into_response()
    }
}

/// Query parameters of the streaming endpoint.
#[derive(Debug, Deserialize)]
pub struct StreamParams {
    /// Conversation id; absent selects the default conversation.
    pub conversation_id: Option<String>,
    /// JSON-encoded transcript.
    pub conv: Option<String>,
}

/// JSON body of the streaming endpoint.
#[derive(Debug, Deserialize)]
pub struct StreamBody {
    /// Conversation id; absent selects the default conversation.
    pub conversation_id: Option<ConversationId>,
    /// Transcript ending with the new user message.
    #[serde(default)]
    pub messages: Vec<TranscriptEntry>,
}

/// Stream a turn whose transcript arrives in the query string.
async fn stream_from_query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
) -> Result<Response, TurnError> {
    let default_id = state.orchestrator.config().stream.default_conversation_id;
    let request = TurnRequest::parse(
        params.conversation_id.as_deref(),
        params.conv.as_deref(),
        default_id,
    )?;
    start_stream(&state, request).await
}

/// Stream a turn whose transcript arrives as a JSON body.
async fn stream_from_json(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StreamBody>,
) -> Result<Response, TurnError> {
    let default_id = state.orchestrator.config().stream.default_conversation_id;
    let request = TurnRequest::new(body.conversation_id, body.messages, default_id)?;
    start_stream(&state, request).await
}

/// Store the user turn synchronously, then relay the reply from a task.
async fn start_stream(state: &Arc<AppState>, request: TurnRequest) -> Result<Response, TurnError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let turn = orchestrator.begin_turn(request).await?;

    let (tx, rx) = mpsc::channel(orchestrator.config().stream.channel_capacity);
    tokio::spawn(async move {
        orchestrator.stream_turn(turn, tx).await;
    });

    Ok(sse_response(rx).into_response())
}

fn sse_response(
    rx: mpsc::Receiver<StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(ReceiverStream::new(rx).map(|event| Ok(to_sse_event(event))))
}

/// Encode a stream event for the wire.
#[must_use]
pub fn to_sse_event(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Fragment(text) => Event::default().data(normalize_newlines(&text)),
        StreamEvent::Heartbeat => Event::default().comment("ping"),
        StreamEvent::Done => Event::default().event("done").data(""),
        StreamEvent::Error(message) => {
            Event::default().data(format!("[Error: {}]", normalize_newlines(&message)))
        }
    }
}

/// SSE fields cannot carry bare carriage returns.
fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Response of the conversation creation endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedConversation {
    /// New conversation id.
    pub conversation_id: ConversationId,
}

/// Create an empty conversation.
async fn create_conversation(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CreatedConversation>, (StatusCode, String)> {
    let conversation_id = state
        .orchestrator
        .store()
        .create_conversation(None)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Store error: {e}")))?;

    tracing::info!(conversation_id = %conversation_id, "created conversation");
    Ok(Json(CreatedConversation { conversation_id }))
}

/// Stored message as returned by the history endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageDto {
    /// Message id.
    pub id: MessageId,
    /// Author.
    pub role: Role,
    /// Verbatim content.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageDto {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            role: m.role,
            content: m.content,
            created_at: m.created_at,
        }
    }
}

/// Return the full history of a conversation.
async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ConversationId>,
) -> Result<Json<Vec<MessageDto>>, (StatusCode, String)> {
    let store = state.orchestrator.store();
    let exists = store
        .conversation_exists(id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Store error: {e}")))?;
    if !exists {
        return Err((StatusCode::NOT_FOUND, format!("conversation {id} not found")));
    }

    let messages = store
        .list_messages(id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Store error: {e}")))?;
    Ok(Json(messages.into_iter().map(MessageDto::from).collect()))
}
