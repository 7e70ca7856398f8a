//! Embedding types and similarity math
//!
//! The vector type and similarity functions are always available; actual
//! embedding generation lives behind the `embeddings` feature and may be
//! absent at runtime (model missing), in which case the engine operates in
//! keyword-only mode.

#[cfg(feature = "embeddings")]
mod local;

#[cfg(feature = "embeddings")]
pub use local::EmbeddingService;

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding model
    #[error("model initialization failed: {0}")]
    ModelInit(String),
    /// Failed to generate an embedding
    #[error("embedding generation failed: {0}")]
    EmbeddingFailed(String),
    /// Invalid input (empty text)
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

// ============================================================================
// EMBEDDING TYPE
// ============================================================================

/// A dense semantic vector
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub dimensions: usize,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        let dimensions = vector.len();
        Self { vector, dimensions }
    }

    /// The placeholder stored when no embedder is available
    pub fn zero(dimensions: usize) -> Self {
        Self { vector: vec![0.0; dimensions], dimensions }
    }

    /// True for the all-zero placeholder
    pub fn is_placeholder(&self) -> bool {
        self.vector.iter().all(|x| *x == 0.0)
    }

    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.dimensions != other.dimensions {
            return 0.0;
        }
        cosine_similarity(&self.vector, &other.vector)
    }

    /// Convert to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        self.vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some(Self::new(vector))
    }
}

/// Cosine similarity normalized to [0, 1]; zero vectors score 0
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
    // Raw cosine is in [-1, 1]; shift into [0, 1] so ranking weights apply
    (((dot / (norm_a * norm_b)) + 1.0) / 2.0).clamp(0.0, 1.0)
}

// ============================================================================
// TESTS
// ============================================================================
