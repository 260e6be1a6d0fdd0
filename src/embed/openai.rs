//! OpenAI `/embeddings` API, also used for OpenAI-compatible hosts such as
//! DeepInfra and for custom embedding models.

use super::{Embedder, batches};
use crate::catalog::DEEPINFRA_BASE_URL;
use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::{RagEvalError, Result};
use crate::llm::{api_error, connection_error, with_retries};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding_format: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Embeddings over the OpenAI wire format.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    provider: EmbeddingProvider,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    /// `dims` of `None` leaves the dimension unknown until probed.
    pub fn new(config: &EmbeddingConfig, dims: Option<usize>) -> Result<Self> {
        let endpoint = if !config.api_base.is_empty() {
            config.api_base.clone()
        } else if config.provider == EmbeddingProvider::OpenAi {
            OPENAI_BASE_URL.to_string()
        } else {
            DEEPINFRA_BASE_URL.to_string()
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| RagEvalError::Http(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            provider: config.provider,
            dims: dims.unwrap_or(0),
            batch_size: config.batch_size,
            max_retries: 2,
        })
    }

    fn request<'a>(&'a self, texts: &'a [String]) -> EmbeddingRequest<'a> {
        EmbeddingRequest {
            model: &self.model,
            input: texts,
            // Some compatible hosts default to base64 output.
            encoding_format: match self.provider {
                EmbeddingProvider::OpenAi => None,
                _ => Some("float"),
            },
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let provider = self.provider.label();
        let url = format!("{}/embeddings", self.endpoint);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request(texts))
            .send()
            .await
            .map_err(|e| connection_error(provider, e))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(match api_error(provider, status, &message) {
                RagEvalError::LlmApi(msg) => RagEvalError::Embedding(msg),
                other => other,
            });
        }

        let result: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| RagEvalError::Embedding(format!("Invalid embedding response: {}", e)))?;
        into_ordered(result.data, texts.len())
    }
}

/// Order vectors by their `index` field when the host provides one.
fn into_ordered(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(RagEvalError::Embedding(format!(
            "Expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in batches(texts, self.batch_size) {
            let embedded =
                with_retries(self.max_retries, "embedding request", || self.embed_batch(batch))
                    .await?;
            vectors.extend(embedded);
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

    fn config(provider: EmbeddingProvider, base: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider,
            api_key: "key".to_string(),
            api_base: base.to_string(),
            model: "custom-model".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_endpoints() {
        let openai = OpenAiEmbedder::new(&config(EmbeddingProvider::OpenAi, ""), None).unwrap();
        assert_eq!(openai.endpoint, "https://api.openai.com/v1");
        assert_eq!(openai.dimension(), 0);

        let compatible =
            OpenAiEmbedder::new(&config(EmbeddingProvider::OpenAiCompatible, ""), Some(4096))
                .unwrap();
        assert_eq!(compatible.endpoint, DEEPINFRA_BASE_URL);
        assert_eq!(compatible.dimension(), 4096);
    }

    #[test]
    fn test_custom_endpoint_is_trimmed() {
        let embedder = OpenAiEmbedder::new(
            &config(EmbeddingProvider::CustomModels, "http://custom:8080/v1/"),
            Some(384),
        )
        .unwrap();
        assert_eq!(embedder.endpoint, "http://custom:8080/v1");
    }

    #[test]
    fn test_compatible_hosts_request_floats() {
        let texts = vec!["a".to_string()];
        let compatible =
            OpenAiEmbedder::new(&config(EmbeddingProvider::OpenAiCompatible, ""), None).unwrap();
        let json = serde_json::to_value(compatible.request(&texts)).unwrap();
        assert_eq!(json["encoding_format"], "float");

        let openai = OpenAiEmbedder::new(&config(EmbeddingProvider::OpenAi, ""), None).unwrap();
        let json = serde_json::to_value(openai.request(&texts)).unwrap();
        assert!(json.get("encoding_format").is_none());
    }

    #[test]
    fn test_vectors_follow_index_order() {
        let data = vec![
            EmbeddingData {
                index: Some(1),
                embedding: vec![2.0],
            },
            EmbeddingData {
                index: Some(0),
                embedding: vec![1.0],
            },
        ];
        let ordered = into_ordered(data, 2).unwrap();
        assert_eq!(ordered, vec![vec![1.0], vec![2.0]]);
        assert!(into_ordered(Vec::new(), 1).is_err());
    }
}
