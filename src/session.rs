//! State carried between commands: the active collection, per-collection
//! file lists, custom metrics and the custom models selected per role.

use crate::catalog::{DEFAULT_COLLECTION, provider_base_url};
use crate::config::{Config, EmbeddingProvider, LlmProvider};
use crate::document::Document;
use crate::error::{RagEvalError, Result};
use crate::eval::metrics::{Metric, MetricSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Where a custom model is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Embedding,
    Inference,
    Evaluation,
    Ocr,
}

impl ModelRole {
    pub const ALL: [ModelRole; 4] = [
        ModelRole::Embedding,
        ModelRole::Inference,
        ModelRole::Evaluation,
        ModelRole::Ocr,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ModelRole::Embedding => "Embedding Model",
            ModelRole::Inference => "Inference Model",
            ModelRole::Evaluation => "Evaluation Model",
            ModelRole::Ocr => "OCR Model",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelRole::Embedding => "embedding",
            ModelRole::Inference => "inference",
            ModelRole::Evaluation => "evaluation",
            ModelRole::Ocr => "ocr",
        };
        f.write_str(name)
    }
}

impl FromStr for ModelRole {
    type Err = RagEvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "embedding" | "embeddings" => Ok(ModelRole::Embedding),
            "inference" | "llm" => Ok(ModelRole::Inference),
            "evaluation" | "judge" => Ok(ModelRole::Evaluation),
            "ocr" => Ok(ModelRole::Ocr),
            other => Err(RagEvalError::InvalidInput(format!(
                "Unknown model role '{}'. Use embedding, inference, evaluation or ocr",
                other
            ))),
        }
    }
}

/// A hosted model picked by name, reached through an OpenAI-compatible API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomModel {
    pub name: String,
    pub api_key: String,
    pub base_url: String,
    /// Hosting provider, e.g. `"DeepInfra"`.
    pub provider: String,
    pub temperature: f32,
    pub fixed_temperature: bool,
    /// Embedding dimension; `None` lets the provider decide.
    pub dimensions: Option<usize>,
}

impl CustomModel {
    /// A model hosted by `provider`, reached at the base URL `config` sets
    /// for that provider.
    pub fn new(name: &str, api_key: &str, provider: &str, config: &Config) -> Result<Self> {
        let base_url = provider_base_url(provider, config).ok_or_else(|| {
            RagEvalError::InvalidInput(format!("Unknown model provider '{}'", provider))
        })?;
        if name.trim().is_empty() || api_key.trim().is_empty() {
            return Err(RagEvalError::InvalidInput(
                "Please fill in all required fields".to_string(),
            ));
        }
        Ok(Self {
            name: name.trim().to_string(),
            api_key: api_key.trim().to_string(),
            base_url: base_url.to_string(),
            provider: provider.to_string(),
            temperature: 0.1,
            fixed_temperature: false,
            dimensions: None,
        })
    }

    /// API key with everything but the last four characters hidden.
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("{}{}", "*".repeat(chars.len().saturating_sub(4).min(8)), tail)
    }
}

/// The custom model selected for each role, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectedModels {
    pub embedding: Option<CustomModel>,
    pub inference: Option<CustomModel>,
    pub evaluation: Option<CustomModel>,
    pub ocr: Option<CustomModel>,
}

impl SelectedModels {
    pub fn get(&self, role: ModelRole) -> Option<&CustomModel> {
        self.slot(role).as_ref()
    }

    pub fn set(&mut self, role: ModelRole, model: CustomModel) {
        *self.slot_mut(role) = Some(model);
    }

    /// Remove the selection for `role`, returning it.
    pub fn clear(&mut self, role: ModelRole) -> Option<CustomModel> {
        self.slot_mut(role).take()
    }

    fn slot(&self, role: ModelRole) -> &Option<CustomModel> {
        match role {
            ModelRole::Embedding => &self.embedding,
            ModelRole::Inference => &self.inference,
            ModelRole::Evaluation => &self.evaluation,
            ModelRole::Ocr => &self.ocr,
        }
    }

    fn slot_mut(&mut self, role: ModelRole) -> &mut Option<CustomModel> {
        match role {
            ModelRole::Embedding => &mut self.embedding,
            ModelRole::Inference => &mut self.inference,
            ModelRole::Evaluation => &mut self.evaluation,
            ModelRole::Ocr => &mut self.ocr,
        }
    }
}

/// Everything remembered between commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub active_collection: String,
    /// Files ingested into each collection.
    pub collection_files: BTreeMap<String, Vec<String>>,
    pub custom_metrics: Vec<Metric>,
    pub selected_models: SelectedModels,
    /// Extracted text per file, kept for review.
    pub extracted_texts: BTreeMap<String, String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            active_collection: DEFAULT_COLLECTION.to_string(),
            collection_files: BTreeMap::new(),
            custom_metrics: Vec::new(),
            selected_models: SelectedModels::default(),
            extracted_texts: BTreeMap::new(),
        }
    }
}

impl Session {
    /// Default metrics followed by this session's custom ones.
    pub fn metric_set(&self) -> MetricSet {
        MetricSet::with_custom(&self.custom_metrics)
    }

    /// Record an ingestion: the collection becomes active and its files
    /// and texts are remembered.
    pub fn record_ingest(&mut self, collection: &str, documents: &[Document]) {
        let files = self
            .collection_files
            .entry(collection.to_string())
            .or_default();
        for doc in documents {
            if !files.contains(&doc.source) {
                files.push(doc.source.clone());
            }
            self.extracted_texts
                .insert(doc.source.clone(), doc.text.clone());
        }
        self.active_collection = collection.to_string();
    }

    /// Forget a dropped collection.
    pub fn forget_collection(&mut self, collection: &str) {
        self.collection_files.remove(collection);
        if self.active_collection == collection {
            self.active_collection = DEFAULT_COLLECTION.to_string();
        }
    }

    /// `config` with every selected custom model applied to its role.
    pub fn resolve(&self, config: &Config) -> Config {
        let mut resolved = config.clone();
        let models = &self.selected_models;

        if let Some(model) = &models.embedding {
            resolved.embedding.provider = EmbeddingProvider::CustomModels;
            resolved.embedding.model = model.name.clone();
            resolved.embedding.api_key = model.api_key.clone();
            resolved.embedding.api_base = model.base_url.clone();
            resolved.embedding.dimensions = model.dimensions;
        }
        for (model, target) in [
            (&models.inference, &mut resolved.llm),
            (&models.evaluation, &mut resolved.judge),
        ] {
            if let Some(model) = model {
                target.provider = LlmProvider::CustomModels;
                target.model = model.name.clone();
                target.api_key = model.api_key.clone();
                target.api_base = model.base_url.clone();
                target.temperature = Some(model.temperature);
                target.fixed_temperature = model.fixed_temperature;
            }
        }
        if let Some(model) = &models.ocr {
            resolved.ocr.model = model.name.clone();
            resolved.ocr.api_key = model.api_key.clone();
            resolved.ocr.api_base = model.base_url.clone();
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DEEPINFRA_BASE_URL;

    fn model(name: &str) -> CustomModel {
        CustomModel::new(name, "di-key-12345", "DeepInfra", &Config::default()).unwrap()
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("judge".parse::<ModelRole>().unwrap(), ModelRole::Evaluation);
        assert_eq!("OCR".parse::<ModelRole>().unwrap(), ModelRole::Ocr);
        assert!("vision".parse::<ModelRole>().is_err());
        assert_eq!(ModelRole::Inference.to_string(), "inference");
    }

    #[test]
    fn test_custom_model_validation() {
        let m = model("meta-llama/Llama-3.3-70B-Instruct");
        assert_eq!(m.base_url, DEEPINFRA_BASE_URL);
        assert_eq!(m.temperature, 0.1);
        assert!(CustomModel::new("", "key", "DeepInfra", &Config::default()).is_err());
        assert!(CustomModel::new("m", "key", "Nowhere", &Config::default()).is_err());
        assert_eq!(m.masked_key(), "********2345");
    }

    #[test]
    fn test_custom_model_uses_configured_deepinfra_url() {
        let mut config = Config::default();
        config.deepinfra_base_url = "https://proxy.example.com/v1/openai".to_string();
        let m = CustomModel::new("BAAI/bge-m3", "key", "DeepInfra", &config).unwrap();
        assert_eq!(m.base_url, "https://proxy.example.com/v1/openai");

        let mut session = Session::default();
        session.selected_models.set(ModelRole::Inference, m);
        let resolved = session.resolve(&config);
        assert_eq!(resolved.llm.base_url(), "https://proxy.example.com/v1/openai");
        assert_eq!(resolved.llm.temperature, Some(0.1));
    }

    #[test]
    fn test_defaults() {
        let session = Session::default();
        assert_eq!(session.active_collection, "rag_collection_eerrur_8415");
        assert!(session.selected_models.get(ModelRole::Inference).is_none());
        assert_eq!(session.metric_set().len(), 8);
    }

    #[test]
    fn test_resolve_applies_selected_models() {
        let mut session = Session::default();
        let mut judge = model("Qwen/Qwen2.5-72B-Instruct");
        judge.fixed_temperature = true;
        session.selected_models.set(ModelRole::Evaluation, judge);
        session
            .selected_models
            .set(ModelRole::Embedding, model("BAAI/bge-m3"));

        let config = Config::default();
        let resolved = session.resolve(&config);

        assert_eq!(resolved.judge.provider, LlmProvider::CustomModels);
        assert_eq!(resolved.judge.model, "Qwen/Qwen2.5-72B-Instruct");
        assert_eq!(resolved.judge.api_base, DEEPINFRA_BASE_URL);
        assert!(resolved.judge.fixed_temperature);
        assert_eq!(resolved.judge.max_tokens, config.judge.max_tokens);
        assert_eq!(resolved.embedding.provider, EmbeddingProvider::CustomModels);
        assert_eq!(resolved.embedding.model, "BAAI/bge-m3");
        // untouched roles keep the configured values
        assert_eq!(resolved.llm.provider, config.llm.provider);
        assert!(resolved.ocr.model.is_empty());

        session.selected_models.clear(ModelRole::Evaluation);
        assert_eq!(session.resolve(&config).judge.provider, LlmProvider::Claude);
    }

    #[test]
    fn test_record_and_forget_collection() {
        let mut session = Session::default();
        let docs = vec![Document::new("a.txt", "alpha"), Document::new("b.md", "beta")];
        session.record_ingest("docs", &docs);
        session.record_ingest("docs", &docs[..1]);

        assert_eq!(session.active_collection, "docs");
        assert_eq!(session.collection_files["docs"], vec!["a.txt", "b.md"]);
        assert_eq!(session.extracted_texts["b.md"], "beta");

        session.forget_collection("docs");
        assert!(session.collection_files.is_empty());
        assert_eq!(session.active_collection, DEFAULT_COLLECTION);
    }
}
