pub mod fallback;
pub mod http;

pub use fallback::FallbackEmbedder;
pub use http::{LocalEmbedder, RemoteEmbedder};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding provider '{provider}' failed: {reason}")]
    Provider { provider: String, reason: String },

    #[error("No embedding provider available")]
    Unavailable,

    #[error("Provider '{provider}' returned {got} vectors for {expected} inputs")]
    CountMismatch {
        provider: String,
        expected: usize,
        got: usize,
    },

    #[error("Vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// A dense-vector embedding backend. Implementations must return one
/// vector per input text, all of the same dimension.
pub trait EmbeddingModel: Send + Sync {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
    fn dimension(&self) -> usize;
    fn name(&self) -> &str;
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Default dimension of the deterministic hash embedder.
pub const HASH_EMBEDDER_DIM: usize = 384;

/// Deterministic embedding backend used when no provider is configured
/// and in tests. Produces stable unit vectors from the text bytes, so
/// repeated runs are byte-identical.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: HASH_EMBEDDER_DIM,
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dimension];
        let bytes = text.as_bytes();
        if bytes.is_empty() {
            vec[0] = 1.0;
            return vec;
        }

        // Spread trigram hashes over the dimensions so texts sharing
        // trigrams share components while distinct texts diverge.
        for window in bytes.windows(3.min(bytes.len()).max(1)) {
            let mut state: u64 = 1469598103934665603;
            for &b in window {
                state ^= b as u64;
                state = state.wrapping_mul(1099511628211);
            }
            let slot = (state % self.dimension as u64) as usize;
            vec[slot] += 1.0 + ((state >> 32) % 7) as f32 / 7.0;
        }

        l2_normalize(&mut vec);
        vec
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for HashEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash"
    }
}
