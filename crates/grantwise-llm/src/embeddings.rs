use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::retry::with_retry;
use async_trait::async_trait;
use serde::Deserialize;

/// Inputs per `/embeddings` request.
const BATCH_SIZE: usize = 64;

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;

    /// Model identifier, recorded alongside stored vectors.
    fn model(&self) -> &str;
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Embedder backed by the OpenAI `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiEmbedder {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let http = config.http_client()?;
        Ok(Self { http, config })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let body = serde_json::json!({
            "model": self.config.embedding_model,
            "input": batch,
        });
        let response = self
            .http
            .post(self.config.endpoint("embeddings"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status, &text));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseParse(e.to_string()))?;
        if parsed.data.len() != batch.len() {
            return Err(LlmError::ResponseParse(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            let embedded = with_retry(&self.config.retry, || self.embed_batch(batch)).await?;
            vectors.extend(embedded);
        }
        tracing::debug!(count = vectors.len(), model = %self.config.embedding_model, "embedded texts");
        Ok(vectors)
    }

    fn model(&self) -> &str {
        &self.config.embedding_model
    }
}
