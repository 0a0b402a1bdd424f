//! Semantic embeddings
//!
//! The engine treats embedding as a pure `text -> vector<f32, D>` function
//! behind the [`TextEmbedder`] trait. The default implementation
//! ([`LocalEmbedder`], feature `embeddings`) runs bge-small-en-v1.5 locally
//! via fastembed; tests use [`StubEmbedder`].
//!
//! Vectors are fixed at 384 dimensions and persisted as little-endian f32
//! blobs.

use serde::{Deserialize, Serialize};

#[cfg(feature = "embeddings")]
mod local;

#[cfg(feature = "embeddings")]
pub use local::LocalEmbedder;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Embedding dimensionality (bge-small-en-v1.5).
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Maximum text length fed to the model (truncated if longer).
pub const MAX_TEXT_LENGTH: usize = 8192;

/// Batch size for efficient embedding generation.
pub const BATCH_SIZE: usize = 32;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error type
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding model
    #[error("Model initialization failed: {0}")]
    ModelInit(String),
    /// Failed to generate an embedding
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
    /// Invalid input (empty, wrong dimensionality, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// ============================================================================
// EMBEDDER TRAIT
// ============================================================================

/// A pure text-to-vector function. Implementations must return vectors of
/// [`EMBEDDING_DIMENSIONS`] length.
pub trait TextEmbedder: Send + Sync {
    /// Generate an embedding for a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts. The default delegates to
    /// [`TextEmbedder::embed`] per item; implementations with real batch
    /// support should override.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Deterministic hash-bucket embedder for tests. Similar word bags produce
/// similar vectors; disjoint ones are near-orthogonal.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubEmbedder;

impl TextEmbedder for StubEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".into()));
        }
        let mut vector = vec![0.0_f32; EMBEDDING_DIMENSIONS];
        for word in text.to_lowercase().split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if word.is_empty() {
                continue;
            }
            let mut hash: u64 = 1469598103934665603;
            for byte in word.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(1099511628211);
            }
            vector[(hash as usize) % EMBEDDING_DIMENSIONS] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }
}

// ============================================================================
// EMBEDDING TYPE
// ============================================================================

/// An embedding vector with its blob codec for storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }

    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }

    /// Serialize to little-endian f32 bytes for BLOB storage.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize from little-endian f32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let vector = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some(Self::new(vector))
    }
}

// ============================================================================
// SIMILARITY FUNCTIONS
// ============================================================================

/// Compute cosine similarity between two vectors.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 { dot / denominator } else { 0.0 }
}

/// An item with its similarity score.
#[derive(Debug, Clone)]
pub struct SimilarityResult<T> {
    pub item: T,
    pub score: f32,
}

/// Rank candidates by cosine similarity to a query vector. Results at or
/// above `threshold` are returned best-first, capped at `top_k`.
pub fn find_similar<T: Clone>(
    query: &[f32],
    candidates: &[(T, Vec<f32>)],
    top_k: usize,
    threshold: f32,
) -> Vec<SimilarityResult<T>> {
    let mut results: Vec<SimilarityResult<T>> = candidates
        .iter()
        .filter_map(|(item, embedding)| {
            let score = cosine_similarity(query, embedding);
            (score >= threshold).then(|| SimilarityResult {
                item: item.clone(),
                score,
            })
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(top_k);
    results
}

// ============================================================================
// TESTS
// ============================================================================
