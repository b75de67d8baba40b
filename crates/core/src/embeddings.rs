use crate::config::Settings;
use crate::error::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier recorded alongside stored vectors.
    fn model_id(&self) -> &str;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>;
}

/// Offline embedder hashing character trigrams into a fixed number of buckets.
#[derive(Debug, Clone)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
    model: String,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model: format!("char-trigram-{dimensions}"),
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

/// Client for OpenAI-compatible `/embeddings` endpoints (text-embeddings-inference,
/// Ollama, vLLM and friends).
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "embeddings".to_string(),
                details: response.status().to_string(),
            });
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(SearchError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!(
                    "returned {} embeddings for {} inputs",
                    parsed.data.len(),
                    texts.len()
                ),
            });
        }

        parsed.data.sort_by_key(|entry| entry.index);
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

pub fn build_embedder(settings: &Settings) -> Arc<dyn Embedder> {
    match &settings.embedding_url {
        Some(url) => Arc::new(HttpEmbedder::new(url, settings.embedding_model.clone())),
        None => {
            let embedder = CharacterNgramEmbedder::default();
            info!(
                model = embedder.model_id(),
                ignored = %settings.embedding_model,
                "EMBEDDING_URL not set, using the offline embedder; EMBEDDING_MODEL is ignored"
            );
            Arc::new(embedder)
        }
    }
}
