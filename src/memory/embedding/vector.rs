//! Fixed-length embedding vectors and their `SQLite` encoding.

use serde::{Deserialize, Serialize};

use crate::memory::core::errors::{MemoryError, MemoryResult};

/// Size in bytes of one encoded component.
const COMPONENT_BYTES: usize = std::mem::size_of::<f32>();

/// A dense embedding vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    /// Vector components.
    pub vec: Vec<f32>,
}

impl Embedding {
    /// Wrap raw components.
    #[must_use]
    pub const fn new(vec: Vec<f32>) -> Self {
        Self { vec }
    }

    /// Zero-filled vector used when the embedding backend is unavailable.
    #[must_use]
    pub fn zeros(ndims: usize) -> Self {
        Self {
            vec: vec![0.0; ndims],
        }
    }

    /// Number of components.
    #[must_use]
    pub fn ndims(&self) -> usize {
        self.vec.len()
    }

    /// Whether every component is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.vec.iter().all(|v| *v == 0.0)
    }

    /// Encode as little-endian `f32` bytes (the layout sqlite-vec reads).
    #[must_use]
    pub fn to_blob(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.vec.len() * COMPONENT_BYTES);
        for value in &self.vec {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Decode little-endian `f32` bytes.
    ///
    /// # Errors
    /// Returns an error if the blob length is not a multiple of four.
    pub fn from_blob(blob: &[u8]) -> MemoryResult<Self> {
        if blob.len() % COMPONENT_BYTES != 0 {
            return Err(MemoryError::InvalidRecord(format!(
                "embedding blob length {} is not a multiple of {COMPONENT_BYTES}",
                blob.len()
            )));
        }

        let vec = blob
            .chunks_exact(COMPONENT_BYTES)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self { vec })
    }

    /// Euclidean distance to another vector, `None` when dimensions differ.
    #[must_use]
    pub fn l2_distance(&self, other: &Self) -> Option<f64> {
        if self.vec.len() != other.vec.len() {
            return None;
        }

        let sum: f64 = self
            .vec
            .iter()
            .zip(&other.vec)
            .map(|(a, b)| {
                let d = f64::from(*a) - f64::from(*b);
                d * d
            })
            .sum();
        Some(sum.sqrt())
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(vec: Vec<f32>) -> Self {
        Self::new(vec)
    }
}
