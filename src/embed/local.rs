//! Local embedding model using candle + sentence-transformers.
//!
//! Serves the HuggingFace and SentenceTransformers providers without any
//! network access after the first model download.

use super::{Embedder, batches};
use crate::error::{RagEvalError, Result};
use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use std::sync::Arc;
use tokenizers::Tokenizer;

const BATCH_SIZE: usize = 32;

fn embedding_error(context: &str, err: impl std::fmt::Display) -> RagEvalError {
    RagEvalError::Embedding(format!("{}: {}", context, err))
}

/// BERT weights plus tokenizer.
struct BertEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    hidden_size: usize,
}

impl BertEncoder {
    /// Generate normalized, mean-pooled embeddings for a batch of texts.
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| embedding_error("Tokenization failed", e))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = Vec::with_capacity(texts.len() * max_len);
        let mut attention = Vec::with_capacity(texts.len() * max_len);

        for encoding in &encodings {
            let mut ids = encoding.get_ids().to_vec();
            let mut mask = encoding.get_attention_mask().to_vec();
            ids.resize(max_len, 0);
            mask.resize(max_len, 0);
            input_ids.extend(ids);
            attention.extend(mask);
        }
        let token_types = vec![0u32; input_ids.len()];

        let shape = (texts.len(), max_len);
        let tensor = |data: Vec<u32>| {
            Tensor::from_vec(data, shape, &self.device).map_err(|e| embedding_error("Tensor", e))
        };
        let input_ids = tensor(input_ids)?;
        let attention_mask = tensor(attention)?;
        let token_type_ids = tensor(token_types)?;

        self.pool(&input_ids, &token_type_ids, &attention_mask)
            .map_err(|e| embedding_error("BERT forward pass failed", e))
    }

    fn pool(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> candle_core::Result<Vec<Vec<f32>>> {
        let output = self
            .model
            .forward(input_ids, token_type_ids, Some(attention_mask))?;

        // Mean pooling over the sequence, ignoring padding.
        let mask = attention_mask
            .unsqueeze(2)?
            .to_dtype(output.dtype())?
            .broadcast_as(output.shape())?;
        let summed = (output * &mask)?.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
        let mean = (summed / counts)?;

        let norms = mean.sqr()?.sum_keepdim(1)?.sqrt()?;
        let normalized = mean.broadcast_div(&norms)?;
        normalized.to_dtype(candle_core::DType::F32)?.to_vec2::<f32>()
    }
}

/// Sentence-transformers model run on the CPU.
pub struct LocalEmbedder {
    encoder: Arc<BertEncoder>,
    model_id: String,
}

impl LocalEmbedder {
    /// Load a model from the Hugging Face Hub. Bare names such as
    /// `all-MiniLM-L6-v2` resolve under `sentence-transformers/`.
    pub fn load(model: &str) -> Result<Self> {
        let model_id = if model.contains('/') {
            model.to_string()
        } else {
            format!("sentence-transformers/{}", model)
        };
        let device = Device::Cpu;

        let api = Api::new().map_err(|e| embedding_error("Failed to create HF Hub API", e))?;
        let repo = api.repo(Repo::new(model_id.clone(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| embedding_error("Failed to get config.json", e))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| embedding_error("Failed to get tokenizer.json", e))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| embedding_error("Failed to get model weights", e))?;

        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| RagEvalError::io(&config_path, e))?;
        let config: BertConfig = serde_json::from_str(&raw)
            .map_err(|e| embedding_error("Failed to parse model config", e))?;
        let hidden_size = serde_json::from_str::<serde_json::Value>(&raw)
            .ok()
            .and_then(|v| v.get("hidden_size").and_then(|h| h.as_u64()))
            .unwrap_or(384) as usize;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| embedding_error("Failed to load tokenizer", e))?;

        // SAFETY: the safetensors file is owned by the hub cache and not
        // modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)
                .map_err(|e| embedding_error("Failed to load model weights", e))?
        };
        let model =
            BertModel::load(vb, &config).map_err(|e| embedding_error("Failed to load BERT", e))?;

        tracing::info!(model = %model_id, dimension = hidden_size, "loaded local embedding model");

        Ok(Self {
            encoder: Arc::new(BertEncoder {
                model,
                tokenizer,
                device,
                hidden_size,
            }),
            model_id,
        })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in batches(texts, BATCH_SIZE) {
            let encoder = Arc::clone(&self.encoder);
            let batch = batch.to_vec();
            let embedded = tokio::task::spawn_blocking(move || encoder.encode(&batch))
                .await
                .map_err(|e| embedding_error("Embedding task failed", e))??;
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.encoder.hidden_size
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
