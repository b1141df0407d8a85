//! Query embedding clients
//!
//! Stored documents arrive already embedded; only query text is embedded at
//! retrieval time. Two HTTP providers are supported: a serverless endpoint
//! speaking the `get_embedding` task protocol, and Ollama.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mmlab_core::{EmbeddingConfig, EmbeddingProvider, MmlabError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

// ============================================================================
// Embedding Trait
// ============================================================================

/// Embeds query text into the same space as the stored documents
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    /// Generate the embedding for a single query
    async fn embed(&self, text: &str) -> Result<Vec<f64>>;

    /// Expected embedding dimension
    fn dimension(&self) -> usize;
}

fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| MmlabError::ProviderError(format!("Failed to build HTTP client: {e}")))
}

/// Check a provider's embedding against the configured dimension.
///
/// A wrong length or a non-finite component is the provider's fault, so both
/// surface as `ProviderError`.
pub fn check_embedding(embedding: Vec<f64>, expected: usize) -> Result<Vec<f64>> {
    if embedding.len() != expected {
        return Err(MmlabError::ProviderError(format!(
            "embedding has {} components, expected {expected}",
            embedding.len()
        )));
    }
    if let Some(index) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(MmlabError::ProviderError(format!(
            "embedding component {index} is {}",
            embedding[index]
        )));
    }
    Ok(embedding)
}

// ============================================================================
// Serverless Endpoint
// ============================================================================

/// Client for a serverless embedding function
pub struct ServerlessEmbedder {
    client: Client,
    url: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct ServerlessRequest<'a> {
    task: &'static str,
    data: ServerlessInput<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessInput<'a> {
    input: &'a str,
    input_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ServerlessResponse {
    embedding: Vec<f64>,
}

impl ServerlessEmbedder {
    pub fn new(url: impl Into<String>, dimension: usize, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            url: url.into(),
            dimension,
        })
    }
}

#[async_trait]
impl QueryEmbedder for ServerlessEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let request = ServerlessRequest {
            task: "get_embedding",
            data: ServerlessInput {
                input: text,
                input_type: "query",
            },
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| MmlabError::ProviderError(format!("Embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MmlabError::ProviderError(format!(
                "Serverless embedding error ({status}): {error_text}"
            )));
        }

        let result: ServerlessResponse = response.json().await.map_err(|e| {
            MmlabError::ProviderError(format!("Failed to parse embedding response: {e}"))
        })?;

        check_embedding(result.embedding, self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f64>,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
        })
    }
}

#[async_trait]
impl QueryEmbedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let request = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| MmlabError::ProviderError(format!("Ollama embedding failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MmlabError::ProviderError(format!(
                "Ollama embedding error: {error_text}"
            )));
        }

        let result: OllamaEmbeddingResponse = response.json().await.map_err(|e| {
            MmlabError::ProviderError(format!("Failed to parse Ollama response: {e}"))
        })?;

        check_embedding(result.embedding, self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Build the configured query embedder.
///
/// Returns `None` in demo mode, where queries reuse a stored embedding.
pub fn create_query_embedder(
    config: &EmbeddingConfig,
    dimension: usize,
) -> Result<Option<Arc<dyn QueryEmbedder>>> {
    match config.provider {
        EmbeddingProvider::Serverless => {
            let url = config.serverless_url.as_ref().ok_or_else(|| {
                MmlabError::ConfigError("Serverless embedding URL required".to_string())
            })?;
            tracing::info!("Using serverless query embedder at {}", url);
            Ok(Some(Arc::new(ServerlessEmbedder::new(
                url.clone(),
                dimension,
                config.timeout_secs,
            )?)))
        }
        EmbeddingProvider::Ollama => {
            tracing::info!(
                "Using Ollama query embedder {} at {}",
                config.model,
                config.ollama_url
            );
            Ok(Some(Arc::new(OllamaEmbedder::new(
                config.ollama_url.clone(),
                config.model.clone(),
                dimension,
                config.timeout_secs,
            )?)))
        }
        EmbeddingProvider::Demo => {
            tracing::info!("No query embedder configured; running in demo mode");
            Ok(None)
        }
    }
}
