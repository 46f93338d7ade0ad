//! Embedding modules.

pub mod embedder;
pub mod vector;

pub use embedder::{EmbedFuture, Embedder, EmbeddingError, FallbackEmbedder, OllamaEmbedder};
pub use vector::Embedding;
