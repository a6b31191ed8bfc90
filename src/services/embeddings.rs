use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// A generated vector plus the token usage the API billed for it.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub tokens_used: u64,
}

/// A batch of vectors with the combined token usage for the call.
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub tokens_used: u64,
}

/// Text-to-vector backend. Abstracted so the processor can be exercised
/// against an in-memory fake in tests.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch, EmbeddingError>;
}

/// Client for an OpenAI-compatible embeddings endpoint.
pub struct EmbeddingClient {
    http: Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
    usage: Usage,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u64,
}

impl EmbeddingClient {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    async fn request(&self, inputs: &[String]) -> Result<EmbeddingsResponse, EmbeddingError> {
        let url = format!("{}/embeddings", self.api_base);
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: EmbeddingsResponse = response.json().await?;
        if parsed.data.len() != inputs.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: inputs.len(),
                got: parsed.data.len(),
            });
        }
        Ok(parsed)
    }
}

#[async_trait]
impl EmbeddingBackend for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut response = self.request(&[text.to_string()]).await?;
        let datum = response
            .data
            .pop()
            .ok_or(EmbeddingError::CountMismatch { expected: 1, got: 0 })?;
        Ok(Embedding {
            vector: datum.embedding,
            tokens_used: response.usage.total_tokens,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch, EmbeddingError> {
        let response = self.request(texts).await?;
        Ok(EmbeddingBatch {
            vectors: response.data.into_iter().map(|d| d.embedding).collect(),
            tokens_used: response.usage.total_tokens,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding API returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}
