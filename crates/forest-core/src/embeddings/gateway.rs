//! Provider variants and the gateway wrapper
//!
//! The gateway owns exactly one provider, chosen once at startup. Per-text
//! failures degrade to `None` (the node is persisted without an embedding
//! and linking proceeds tag-only); only initialization errors surface.

use super::{Embedding, EmbeddingError};
use sha2::{Digest, Sha256};

/// Dimension of the mock provider
pub const MOCK_DIMENSIONS: usize = 384;

// ============================================================================
// MOCK PROVIDER
// ============================================================================

/// Deterministic hash-seeded embedder for tests
///
/// The vector is derived from repeated SHA-256 over the input text, so the
/// same text always embeds identically within and across processes.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedder {
    _unused: (),
}

impl MockEmbedder {
    /// Create a new mock embedder
    pub fn new() -> Self {
        Self { _unused: () }
    }

    /// Produce the deterministic pseudo-random vector for a text
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = Vec::with_capacity(MOCK_DIMENSIONS);
        let seed = Sha256::digest(text.as_bytes());
        let mut counter: u32 = 0;

        while vector.len() < MOCK_DIMENSIONS {
            let mut hasher = Sha256::new();
            hasher.update(seed);
            hasher.update(counter.to_le_bytes());
            let block = hasher.finalize();
            for chunk in block.chunks_exact(4) {
                if vector.len() >= MOCK_DIMENSIONS {
                    break;
                }
                let v = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                // Map onto [-1, 1]
                vector.push((v as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32);
            }
            counter += 1;
        }

        Embedding::new(vector)
    }
}

// ============================================================================
// PROVIDER SELECTION
// ============================================================================

/// The recognized provider variants
///
/// Dynamic "plug in a provider by environment string" becomes this tagged
/// enum; selection happens once and is immutable for the run.
#[non_exhaustive]
pub enum EmbeddingProvider {
    /// Local sentence-transformer via fastembed (384-dim)
    #[cfg(feature = "local-embeddings")]
    Local(super::local::LocalEmbedder),
    /// Hosted endpoint (1536-dim), requires an API key
    #[cfg(feature = "remote-embeddings")]
    Remote(super::remote::RemoteEmbedder),
    /// Deterministic hash-seeded vectors for tests (384-dim)
    Mock(MockEmbedder),
    /// Always returns no embedding; the system degrades to tag-only scoring
    Disabled,
}

impl std::fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl EmbeddingProvider {
    /// Human-readable provider name
    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "local-embeddings")]
            EmbeddingProvider::Local(_) => "local",
            #[cfg(feature = "remote-embeddings")]
            EmbeddingProvider::Remote(_) => "remote",
            EmbeddingProvider::Mock(_) => "mock",
            EmbeddingProvider::Disabled => "none",
        }
    }

    /// Select a provider from `FOREST_EMBEDDINGS` (local | remote | mock | none)
    ///
    /// Unknown or unavailable values fall back to the null provider with a
    /// warning rather than failing startup.
    pub fn from_env() -> Self {
        let requested = std::env::var("FOREST_EMBEDDINGS").unwrap_or_default();
        match requested.as_str() {
            #[cfg(feature = "local-embeddings")]
            "local" => EmbeddingProvider::Local(super::local::LocalEmbedder::new()),
            #[cfg(feature = "remote-embeddings")]
            "remote" => EmbeddingProvider::Remote(super::remote::RemoteEmbedder::from_env()),
            "mock" => EmbeddingProvider::Mock(MockEmbedder::new()),
            "none" | "" => EmbeddingProvider::Disabled,
            other => {
                tracing::warn!(
                    "Unknown or unavailable embedding provider '{}', running without embeddings",
                    other
                );
                EmbeddingProvider::Disabled
            }
        }
    }
}

// ============================================================================
// GATEWAY
// ============================================================================

/// The embedding gateway consumed by capture, linking, and search
pub struct EmbeddingGateway {
    provider: EmbeddingProvider,
}

impl EmbeddingGateway {
    /// Wrap a provider chosen at startup
    pub fn new(provider: EmbeddingProvider) -> Self {
        Self { provider }
    }

    /// Gateway with the null provider
    pub fn disabled() -> Self {
        Self::new(EmbeddingProvider::Disabled)
    }

    /// Gateway with the deterministic mock provider
    pub fn mock() -> Self {
        Self::new(EmbeddingProvider::Mock(MockEmbedder::new()))
    }

    /// Provider name for logs and stats
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Declared dimension; 0 when embeddings are disabled
    pub fn dimensions(&self) -> usize {
        match &self.provider {
            #[cfg(feature = "local-embeddings")]
            EmbeddingProvider::Local(_) => super::local::LOCAL_DIMENSIONS,
            #[cfg(feature = "remote-embeddings")]
            EmbeddingProvider::Remote(_) => super::remote::REMOTE_DIMENSIONS,
            EmbeddingProvider::Mock(_) => MOCK_DIMENSIONS,
            EmbeddingProvider::Disabled => 0,
        }
    }

    /// Embed one text; `Ok(None)` when no embedding is available
    ///
    /// Per-text provider failures are logged and degrade to `None` so the
    /// caller can continue with tag-only scoring.
    pub fn embed(&self, text: &str) -> Result<Option<Embedding>, EmbeddingError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        match &self.provider {
            #[cfg(feature = "local-embeddings")]
            EmbeddingProvider::Local(embedder) => match embedder.embed(text) {
                Ok(emb) => Ok(Some(emb)),
                Err(EmbeddingError::ProviderInit(e)) => Err(EmbeddingError::ProviderInit(e)),
                Err(e) => {
                    tracing::warn!("Local embedding failed, continuing without: {}", e);
                    Ok(None)
                }
            },
            #[cfg(feature = "remote-embeddings")]
            EmbeddingProvider::Remote(embedder) => match embedder.embed(text) {
                Ok(emb) => Ok(Some(emb)),
                Err(EmbeddingError::ProviderInit(e)) => Err(EmbeddingError::ProviderInit(e)),
                Err(e) => {
                    tracing::warn!("Remote embedding failed, continuing without: {}", e);
                    Ok(None)
                }
            },
            EmbeddingProvider::Mock(embedder) => Ok(Some(embedder.embed_text(text))),
            EmbeddingProvider::Disabled => Ok(None),
        }
    }

    /// Embed many texts; result has the same length and order as the input
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Option<Embedding>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// True when a stored vector matches the active dimension
    ///
    /// With embeddings disabled there is no active dimension and stored
    /// vectors of any single dimension remain comparable to each other.
    pub fn accepts_dimension(&self, dim: usize) -> bool {
        let d = self.dimensions();
        d == 0 || d == dim
    }
}
