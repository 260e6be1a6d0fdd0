//! Ollama's local `/api/embed` endpoint.

use super::{Embedder, batches};
use crate::config::EmbeddingConfig;
use crate::error::{RagEvalError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embeddings from a local Ollama server. No API key needed.
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dims: usize,
    batch_size: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig, dims: Option<usize>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| RagEvalError::Http(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.ollama_base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: dims.unwrap_or(0),
            batch_size: config.batch_size,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.endpoint);
        let request = OllamaEmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RagEvalError::Connection(format!(
                        "Cannot reach Ollama at {}. Is `ollama serve` running? ({})",
                        self.endpoint, e
                    ))
                } else {
                    RagEvalError::from(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagEvalError::Embedding(format!(
                "Ollama API error {status}: {body}"
            )));
        }

        let result: OllamaEmbeddingResponse = response.json().await?;
        if result.embeddings.len() != texts.len() {
            return Err(RagEvalError::Embedding(format!(
                "Expected {} embeddings from Ollama, got {}",
                texts.len(),
                result.embeddings.len()
            )));
        }
        Ok(result.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in batches(texts, self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingProvider;

    #[test]
    fn test_ollama_embedder_creation() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Ollama,
            model: "nomic-embed-text".to_string(),
            ollama_base_url: "http://ollama:11434/".to_string(),
            ..Default::default()
        };
        let embedder = OllamaEmbedder::new(&config, Some(768)).unwrap();
        assert_eq!(embedder.dimension(), 768);
        assert_eq!(embedder.model_name(), "nomic-embed-text");
        assert_eq!(embedder.endpoint, "http://ollama:11434");
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_requests() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Ollama,
            // Nothing listens here; an empty batch must not reach it.
            ollama_base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let embedder = OllamaEmbedder::new(&config, Some(768)).unwrap();
        assert!(embedder.embed_documents(&[]).await.unwrap().is_empty());
    }
}
