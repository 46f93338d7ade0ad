//! Generation backends and their streaming wire format.

pub mod ndjson;
pub mod ollama_stream;

pub use ndjson::{DEFAULT_MAX_LINE_BYTES, GenerateChunk, LineTooLong, NdjsonDecoder};
pub use ollama_stream::{FragmentStream, GenerationError, Generator, OllamaGenerator, decode_ndjson};
