//! Text embedding providers.
//!
//! Every provider turns text into fixed-length vectors. The vector length must
//! match the collection the vectors are stored in, so [`create_embedder`]
//! resolves it up front: from the config, then the model catalog, and as a
//! last resort by embedding a probe string.

#[cfg(feature = "local-embeddings")]
mod local;
mod ollama;
mod openai;

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

use crate::catalog::embedding_model;
use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::{RagEvalError, Result};
use async_trait::async_trait;

/// Converts text into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of document chunks, preserving order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagEvalError::Embedding("Empty embedding response".to_string()))
    }

    /// Length of the produced vectors; 0 when not yet known.
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Build the embedder for `config`, resolving its vector dimension.
pub async fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    if config.provider.requires_api_key() && config.api_key.is_empty() {
        return Err(RagEvalError::Config(format!(
            "{} API key is required for embeddings",
            config.provider
        )));
    }

    let known = config.dimensions.or_else(|| {
        embedding_model(config.provider, &config.model).map(|info| info.dimensions)
    });

    let embedder: Box<dyn Embedder> = match config.provider {
        EmbeddingProvider::OpenAi
        | EmbeddingProvider::OpenAiCompatible
        | EmbeddingProvider::CustomModels => Box::new(OpenAiEmbedder::new(config, known)?),
        EmbeddingProvider::Ollama => Box::new(OllamaEmbedder::new(config, known)?),
        EmbeddingProvider::HuggingFace | EmbeddingProvider::SentenceTransformers => {
            create_local(config)?
        }
    };

    if embedder.dimension() > 0 {
        return Ok(embedder);
    }

    let dimension = probe_dimension(embedder.as_ref()).await?;
    tracing::info!(
        model = %config.model,
        dimension,
        "probed embedding dimension"
    );
    match config.provider {
        EmbeddingProvider::Ollama => Ok(Box::new(OllamaEmbedder::new(config, Some(dimension))?)),
        _ => Ok(Box::new(OpenAiEmbedder::new(config, Some(dimension))?)),
    }
}

/// Embed a short text and measure the result.
pub async fn probe_dimension(embedder: &dyn Embedder) -> Result<usize> {
    let vector = embedder.embed_query("dimension probe").await?;
    if vector.is_empty() {
        return Err(RagEvalError::Embedding(format!(
            "Model {} returned an empty vector",
            embedder.model_name()
        )));
    }
    Ok(vector.len())
}

#[cfg(feature = "local-embeddings")]
fn create_local(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    Ok(Box::new(LocalEmbedder::load(&config.model)?))
}

#[cfg(not(feature = "local-embeddings"))]
fn create_local(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    Err(RagEvalError::Config(format!(
        "{} embeddings run locally; rebuild with `--features local-embeddings`",
        config.provider
    )))
}

/// Split `texts` into request-sized batches.
pub(crate) fn batches(texts: &[String], batch_size: usize) -> impl Iterator<Item = &[String]> {
    texts.chunks(batch_size.max(1))
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);

        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_batches_respect_size() {
        let texts: Vec<String> = (0..70).map(|i| i.to_string()).collect();
        let sizes: Vec<usize> = batches(&texts, 32).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![32, 32, 6]);
        assert_eq!(batches(&texts, 0).count(), 70);
    }

    #[tokio::test]
    async fn test_openai_requires_key() {
        let config = EmbeddingConfig::default();
        let err = create_embedder(&config).await.err().unwrap();
        assert!(matches!(err, RagEvalError::Config(_)));
    }

    #[tokio::test]
    async fn test_catalog_dimension_is_used() {
        let config = EmbeddingConfig {
            api_key: "key".to_string(),
            model: "text-embedding-3-small".to_string(),
            ..Default::default()
        };
        let embedder = create_embedder(&config).await.unwrap();
        assert_eq!(embedder.dimension(), 1536);
        assert_eq!(embedder.model_name(), "text-embedding-3-small");
    }

    #[tokio::test]
    async fn test_configured_dimension_wins() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Ollama,
            model: "nomic-embed-text".to_string(),
            dimensions: Some(512),
            ..Default::default()
        };
        let embedder = create_embedder(&config).await.unwrap();
        assert_eq!(embedder.dimension(), 512);
    }
}
