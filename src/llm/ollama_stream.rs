//! Streaming generation client for the Ollama `/api/generate` endpoint.

use std::fmt;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::llm::ndjson::{GenerateChunk, NdjsonDecoder};
use crate::memory::core::config::LlmConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};

/// Fragments of one generation, ended by completion or one terminal error.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Failure of a generation stream.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Backend unreachable or the request could not be sent.
    #[error("generation request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Backend answered with a non-success status.
    #[error("generation service returned status code {0}")]
    Status(u16),
    /// Response body failed mid-stream.
    #[error("generation stream interrupted: {0}")]
    Read(String),
    /// Backend reported an error record.
    #[error("generation backend error: {0}")]
    Backend(String),
}

/// Trait abstraction over token-streaming generation backends.
pub trait Generator: Send + Sync {
    /// Start generating `prompt` with `model`.
    ///
    /// Every call issues a fresh request. Failures are delivered in-band as
    /// the last item of the stream.
    fn stream(&self, model: &str, prompt: &str) -> FragmentStream;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Ollama generation client.
#[derive(Clone)]
pub struct OllamaGenerator {
    client: Client,
    url: String,
}

impl OllamaGenerator {
    /// Create a generator from config.
    ///
    /// Only connecting is bounded by a timeout; generations may run long.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> MemoryResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|err| MemoryError::InvalidConfig(format!("generation client: {err}")))?;
        Ok(Self {
            client,
            url: format!("{}/api/generate", config.base_url.trim_end_matches('/')),
        })
    }
}

impl Generator for OllamaGenerator {
    fn stream(&self, model: &str, prompt: &str) -> FragmentStream {
        let request = self
            .client
            .post(&self.url)
            .json(&GenerateRequest { model, prompt });
        debug!(model, prompt_len = prompt.len(), "starting generation stream");

        let response = async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(GenerationError::Status(status.as_u16()));
            }
            Ok::<_, GenerationError>(decode_ndjson(response.bytes_stream()))
        };

        Box::pin(stream::once(response).try_flatten())
    }
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: NdjsonDecoder,
    finished: bool,
}

impl<S> DecodeState<S> {
    /// Map a record to the item it produces.
    fn on_record(&mut self, chunk: GenerateChunk) -> Result<String, GenerationError> {
        if let Some(message) = chunk.error {
            self.finished = true;
            return Err(GenerationError::Backend(message));
        }
        if chunk.done {
            self.finished = true;
        }
        trace!(len = chunk.response.len(), done = chunk.done, "fragment");
        Ok(chunk.response)
    }
}

/// Decode an NDJSON byte stream into generation fragments.
///
/// Every record yields its `response`, which may be empty. A record with
/// `done: true` ends the stream even if bytes remain. A body that ends
/// cleanly without it is also a normal completion. A body read error or an
/// unterminated line over [`crate::llm::ndjson::DEFAULT_MAX_LINE_BYTES`]
/// ends the stream with [`GenerationError::Read`].
pub fn decode_ndjson<S, B, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: NdjsonDecoder::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            match state.decoder.next_record() {
                Ok(Some(chunk)) => {
                    let item = state.on_record(chunk);
                    return Some((item, state));
                }
                Ok(None) => {}
                Err(err) => {
                    state.finished = true;
                    return Some((Err(GenerationError::Read(err.to_string())), state));
                }
            }

            match state.body.next().await {
                Some(Ok(bytes)) => state.decoder.push(bytes.as_ref()),
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(GenerationError::Read(err.to_string())), state));
                }
                None => {
                    state.finished = true;
                    let item = state
                        .decoder
                        .finish()
                        .map(|chunk| state.on_record(chunk))?;
                    return Some((item, state));
                }
            }
        }
    }))
}
