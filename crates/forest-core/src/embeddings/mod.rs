//! Embedding gateway
//!
//! Maps text to a fixed-dimension real vector, or reports "no embedding".
//! Four provider variants are recognized: a local ONNX model (feature
//! `local-embeddings`), a hosted remote endpoint (feature
//! `remote-embeddings`), a deterministic mock for tests, and a null
//! provider that degrades the system to tag-only scoring.
//!
//! Selection is process-wide and immutable for the lifetime of a run.
//! Vectors need not be unit length; the scorer normalizes at compare time.

mod gateway;

#[cfg(feature = "local-embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "local-embeddings")))]
mod local;

#[cfg(feature = "remote-embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "remote-embeddings")))]
mod remote;

pub use gateway::{EmbeddingGateway, EmbeddingProvider, MockEmbedder, MOCK_DIMENSIONS};

#[cfg(feature = "local-embeddings")]
pub use local::{LocalEmbedder, LOCAL_DIMENSIONS};

#[cfg(feature = "remote-embeddings")]
pub use remote::{RemoteEmbedder, REMOTE_DIMENSIONS};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error type
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Failed to initialize the provider
    #[error("provider initialization failed: {0}")]
    ProviderInit(String),
    /// Failed to generate an embedding
    #[error("embedding generation failed: {0}")]
    EmbeddingFailed(String),
    /// Invalid input (empty, unparseable response, ...)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A stored or produced vector does not match the active dimension
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Active provider dimension
        expected: usize,
        /// Observed vector length
        got: usize,
    },
}

// ============================================================================
// EMBEDDING TYPE
// ============================================================================

/// A dense embedding vector
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The vector
    pub vector: Vec<f32>,
    /// Dimensions of the vector
    pub dimensions: usize,
}

impl Embedding {
    /// Create a new embedding from a vector
    pub fn new(vector: Vec<f32>) -> Self {
        let dimensions = vector.len();
        Self { vector, dimensions }
    }

    /// Pack as little-endian f32 bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        self.vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Unpack from little-endian f32 bytes; length implicit from the blob
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            return None;
        }
        let vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some(Self::new(vector))
    }

    /// Normalize to unit length in place
    pub fn normalize(&mut self) {
        let norm = self.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut self.vector {
                *x /= norm;
            }
        }
    }
}

// ============================================================================
// SIMILARITY
// ============================================================================

/// Cosine similarity between two vectors; 0 when lengths differ or a side is zero
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        dot_product / denominator
    } else {
        0.0
    }
}
