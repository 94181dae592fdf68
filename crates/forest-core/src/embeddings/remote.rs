//! Remote embedding provider
//!
//! A hosted `text-embedding-3-small`-style endpoint returning 1536-dim
//! vectors. Requires `FOREST_EMBED_API_KEY`; the endpoint defaults to the
//! OpenAI-compatible embeddings route and can be overridden with
//! `FOREST_EMBED_URL`.

use super::{Embedding, EmbeddingError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Dimension of the remote model
pub const REMOTE_DIMENSIONS: usize = 1536;

/// Per-request timeout; a timeout degrades the node to tag-only scoring
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_MODEL: &str = "text-embedding-3-small";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Remote HTTP provider
pub struct RemoteEmbedder {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl RemoteEmbedder {
    /// Configure from the environment
    pub fn from_env() -> Self {
        let url = std::env::var("FOREST_EMBED_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        let model =
            std::env::var("FOREST_EMBED_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let api_key = std::env::var("FOREST_EMBED_API_KEY").ok().filter(|k| !k.is_empty());

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            url,
            model,
            api_key,
        }
    }

    /// Embed a single text over HTTP
    pub fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "Text cannot be empty".to_string(),
            ));
        }

        let api_key = self.api_key.as_deref().ok_or_else(|| {
            EmbeddingError::ProviderInit(
                "FOREST_EMBED_API_KEY is not set; the remote provider requires an API key"
                    .to_string(),
            )
        })?;

        let body = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| EmbeddingError::InvalidInput(format!("unparseable response: {}", e)))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("empty response".to_string()))?;

        if vector.len() != REMOTE_DIMENSIONS {
            return Err(EmbeddingError::DimensionMismatch {
                expected: REMOTE_DIMENSIONS,
                got: vector.len(),
            });
        }

        Ok(Embedding::new(vector))
    }
}
