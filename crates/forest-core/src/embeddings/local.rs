//! Local embedding provider
//!
//! fastembed (ONNX) running all-MiniLM-L6-v2 on-device: 384 dimensions, no
//! network access after the model is cached.

use super::{Embedding, EmbeddingError};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Mutex, OnceLock};

/// Dimension of the local model
pub const LOCAL_DIMENSIONS: usize = 384;

/// Maximum text length for embedding (truncated if longer)
pub const MAX_TEXT_LENGTH: usize = 8192;

/// Batch size for efficient embedding generation
pub const BATCH_SIZE: usize = 32;

/// The model is a process-wide singleton; safe for serial reuse but not
/// guaranteed reentrant, hence the Mutex.
static EMBEDDING_MODEL_RESULT: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

/// Cache directory for model files
///
/// `FOREST_EMBED_CACHE` wins, then the platform cache dir.
fn get_cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FOREST_EMBED_CACHE") {
        return std::path::PathBuf::from(path);
    }

    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "forest", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs.home_dir().join(".cache/forest/fastembed");
    }

    std::path::PathBuf::from(".fastembed_cache")
}

fn get_model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = EMBEDDING_MODEL_RESULT.get_or_init(|| {
        let cache_dir = get_cache_dir();

        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("Failed to create cache directory {:?}: {}", cache_dir, e);
        }

        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(true)
            .with_cache_dir(cache_dir);

        TextEmbedding::try_new(options).map(Mutex::new).map_err(|e| {
            format!(
                "Failed to initialize all-MiniLM-L6-v2 embedding model: {}. \
                Ensure ONNX runtime is available and model files can be downloaded.",
                e
            )
        })
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::ProviderInit(format!("Lock poisoned: {}", e))),
        Err(err) => Err(EmbeddingError::ProviderInit(err.clone())),
    }
}

/// Local fastembed provider
#[derive(Debug, Clone, Default)]
pub struct LocalEmbedder {
    _unused: (),
}

impl LocalEmbedder {
    /// Create the provider; the model loads lazily on first embed
    pub fn new() -> Self {
        Self { _unused: () }
    }

    /// True when the model loaded (or can load) successfully
    pub fn is_ready(&self) -> bool {
        match get_model() {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Embedding model not ready: {}", e);
                false
            }
        }
    }

    /// Embed a single text
    pub fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "Text cannot be empty".to_string(),
            ));
        }

        let mut model = get_model()?;

        let text = if text.len() > MAX_TEXT_LENGTH {
            let mut end = MAX_TEXT_LENGTH;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            &text[..end]
        } else {
            text
        };

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        let vector = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding generated".to_string()))?;

        if vector.len() != LOCAL_DIMENSIONS {
            return Err(EmbeddingError::DimensionMismatch {
                expected: LOCAL_DIMENSIONS,
                got: vector.len(),
            });
        }

        Ok(Embedding::new(vector))
    }
}
