//! Configuration for the RAG evaluator.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::catalog::DEEPINFRA_BASE_URL;
use crate::error::{RagEvalError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Chat model providers for answer generation and judging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProvider {
    #[serde(rename = "OpenAI")]
    OpenAi,
    #[serde(rename = "Groq")]
    Groq,
    #[serde(rename = "Together AI")]
    TogetherAi,
    #[serde(rename = "DeepInfra")]
    DeepInfra,
    #[serde(rename = "Custom Models")]
    CustomModels,
    #[serde(rename = "Claude")]
    Claude,
}

impl LlmProvider {
    /// Base URL used when the config does not set one.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "https://api.openai.com/v1",
            LlmProvider::Groq => "https://api.groq.com/openai/v1",
            LlmProvider::TogetherAi => "https://api.together.xyz/v1",
            LlmProvider::DeepInfra | LlmProvider::CustomModels => DEEPINFRA_BASE_URL,
            LlmProvider::Claude => "https://api.anthropic.com/v1",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "OpenAI",
            LlmProvider::Groq => "Groq",
            LlmProvider::TogetherAi => "Together AI",
            LlmProvider::DeepInfra => "DeepInfra",
            LlmProvider::CustomModels => "Custom Models",
            LlmProvider::Claude => "Claude",
        }
    }

    /// Where the user can obtain a key, shown next to authentication errors.
    pub fn key_hint(&self) -> &'static str {
        match self {
            LlmProvider::Claude => "Get your Claude API key from https://console.anthropic.com/",
            LlmProvider::OpenAi => {
                "Get your OpenAI API key from https://platform.openai.com/api-keys"
            }
            _ => "Check the API key in your configuration or selected model",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LlmProvider {
    type Err = RagEvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "groq" => Ok(LlmProvider::Groq),
            "together ai" | "together" | "togetherai" => Ok(LlmProvider::TogetherAi),
            "deepinfra" => Ok(LlmProvider::DeepInfra),
            "custom models" | "custom" => Ok(LlmProvider::CustomModels),
            "claude" | "anthropic" => Ok(LlmProvider::Claude),
            other => Err(RagEvalError::Config(format!("Unsupported provider: {}", other))),
        }
    }
}

/// Embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingProvider {
    #[serde(rename = "OpenAI")]
    OpenAi,
    #[serde(rename = "OpenAI-Compatible")]
    OpenAiCompatible,
    #[serde(rename = "Custom Models")]
    CustomModels,
    #[serde(rename = "HuggingFace")]
    HuggingFace,
    #[serde(rename = "SentenceTransformers")]
    SentenceTransformers,
    #[serde(rename = "Ollama")]
    Ollama,
}

impl EmbeddingProvider {
    pub fn label(&self) -> &'static str {
        match self {
            EmbeddingProvider::OpenAi => "OpenAI",
            EmbeddingProvider::OpenAiCompatible => "OpenAI-Compatible",
            EmbeddingProvider::CustomModels => "Custom Models",
            EmbeddingProvider::HuggingFace => "HuggingFace",
            EmbeddingProvider::SentenceTransformers => "SentenceTransformers",
            EmbeddingProvider::Ollama => "Ollama",
        }
    }

    /// Whether requests to this provider need an API key.
    pub fn requires_api_key(&self) -> bool {
        matches!(
            self,
            EmbeddingProvider::OpenAi
                | EmbeddingProvider::OpenAiCompatible
                | EmbeddingProvider::CustomModels
        )
    }
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EmbeddingProvider {
    type Err = RagEvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "openai" => Ok(EmbeddingProvider::OpenAi),
            "openaicompatible" => Ok(EmbeddingProvider::OpenAiCompatible),
            "custommodels" | "custom" => Ok(EmbeddingProvider::CustomModels),
            "huggingface" => Ok(EmbeddingProvider::HuggingFace),
            "sentencetransformers" => Ok(EmbeddingProvider::SentenceTransformers),
            "ollama" => Ok(EmbeddingProvider::Ollama),
            other => Err(RagEvalError::Config(format!(
                "Unsupported embedding provider: {}",
                other
            ))),
        }
    }
}

/// Chat model configuration, used for both answer generation and judging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Which API family to talk to.
    pub provider: LlmProvider,

    /// Base URL including the version segment (e.g., "https://api.openai.com/v1").
    /// Empty means the provider default.
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4o", "claude-sonnet-4-20250514")
    pub model: String,

    /// Maximum tokens for response
    pub max_tokens: u32,

    /// Sampling temperature; `None` leaves it to the provider.
    pub temperature: Option<f32>,

    /// Forces temperature 1.0, for models that reject any other value.
    pub fixed_temperature: bool,

    /// Per-request timeout.
    pub timeout_secs: u64,

    /// Retries after the first attempt on transient failures.
    pub max_retries: u32,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout_secs() -> u64 {
    360
}

fn default_max_retries() -> u32 {
    2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            max_tokens: default_max_tokens(),
            temperature: Some(default_temperature()),
            fixed_temperature: false,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl LlmConfig {
    /// Default judge settings: Claude Sonnet at low temperature.
    pub fn judge_default() -> Self {
        Self {
            provider: LlmProvider::Claude,
            model: "claude-sonnet-4-20250514".to_string(),
            ..Default::default()
        }
    }

    /// The configured base URL, or the provider's default.
    pub fn base_url(&self) -> &str {
        if self.api_base.is_empty() {
            self.provider.default_base_url()
        } else {
            &self.api_base
        }
    }

    /// `"<provider> - <model>"`, the label stored with every result.
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.provider, self.model)
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub api_key: String,
    /// OpenAI-compatible base URL. Empty means the provider default.
    pub api_base: String,
    pub ollama_base_url: String,
    /// Overrides the catalog/probed vector dimension.
    pub dimensions: Option<usize>,
    /// Texts sent per embedding request.
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAi,
            model: "text-embedding-3-large".to_string(),
            api_key: String::new(),
            api_base: String::new(),
            ollama_base_url: "http://localhost:11434".to_string(),
            dimensions: None,
            batch_size: 32,
        }
    }
}

/// Milvus connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilvusConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Database name; empty means Milvus' "default".
    pub database: String,
    pub timeout_secs: u64,
}

impl Default for MilvusConfig {
    fn default() -> Self {
        Self {
            host: default_milvus_host(),
            port: 19530,
            user: String::new(),
            password: String::new(),
            database: String::new(),
            timeout_secs: 30,
        }
    }
}

impl MilvusConfig {
    /// HTTP endpoint of the Milvus RESTful API.
    pub fn endpoint(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    /// Bearer token built from the credentials, if any were given.
    pub fn token(&self) -> Option<String> {
        if self.user.is_empty() && self.password.is_empty() {
            None
        } else {
            Some(format!("{}:{}", self.user, self.password))
        }
    }
}

/// Inside the docker-compose stack Milvus is reachable by its service name.
fn default_milvus_host() -> String {
    if Path::new("/.dockerenv").exists() {
        "standalone".to_string()
    } else {
        "localhost".to_string()
    }
}

/// Vision model used to read scanned PDFs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub model: String,
    pub api_key: String,
    pub api_base: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            api_key: String::new(),
            api_base: String::new(),
        }
    }
}

impl OcrConfig {
    pub fn is_configured(&self) -> bool {
        !self.model.is_empty() && !self.api_key.is_empty()
    }

    /// OCR requests go through the OpenAI-compatible chat client.
    pub fn to_llm_config(&self) -> LlmConfig {
        LlmConfig {
            provider: LlmProvider::CustomModels,
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            temperature: None,
            ..Default::default()
        }
    }
}

/// Retrieval and chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Chunks retrieved per question.
    pub num_chunks: usize,
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            num_chunks: 5,
            chunk_size: 1000,
            chunk_overlap: 50,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub milvus: MilvusConfig,
    /// Model that answers questions over retrieved context.
    pub llm: LlmConfig,
    /// Model that scores answers.
    pub judge: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub ocr: OcrConfig,
    pub rag: RagConfig,
    pub deepinfra_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            milvus: MilvusConfig::default(),
            llm: LlmConfig::default(),
            judge: LlmConfig::judge_default(),
            embedding: EmbeddingConfig::default(),
            ocr: OcrConfig::default(),
            rag: RagConfig::default(),
            deepinfra_base_url: DEEPINFRA_BASE_URL.to_string(),
        }
    }
}

/// Configuration file structure (YAML format).
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    milvus: Option<MilvusFileSection>,
    llm: Option<LlmFileSection>,
    judge: Option<LlmFileSection>,
    embedding: Option<EmbeddingFileSection>,
    ocr: Option<OcrFileSection>,
    rag: Option<RagFileSection>,
    deepinfra_base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MilvusFileSection {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    provider: Option<String>,
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingFileSection {
    provider: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    api_base: Option<String>,
    ollama_base_url: Option<String>,
    dimensions: Option<usize>,
    batch_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OcrFileSection {
    model: Option<String>,
    api_key: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RagFileSection {
    num_chunks: Option<usize>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

impl LlmFileSection {
    fn apply(self, llm: &mut LlmConfig) -> Result<()> {
        if let Some(provider) = self.provider {
            llm.provider = provider.parse()?;
        }
        set(&mut llm.api_base, self.api_base);
        set(&mut llm.api_key, self.api_key);
        set(&mut llm.model, self.model);
        set(&mut llm.max_tokens, self.max_tokens);
        set(&mut llm.temperature, self.temperature.map(Some));
        set(&mut llm.timeout_secs, self.timeout_secs);
        set(&mut llm.max_retries, self.max_retries);
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|v| v.parse().ok())
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (MILVUS_HOST, LLM_API_KEY, JUDGE_MODEL, ...)
    /// 2. Config file (~/.config/rag-evaluator/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Like [`Config::load`], reading `path` instead of the default config
    /// file. An explicit path must exist.
    pub fn load_with(path: Option<&PathBuf>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::config_file_path() {
                Some(default_path) if default_path.exists() => {
                    Self::load_from_file(&default_path)?
                }
                _ => Config::default(),
            },
        };

        config.apply_env()?;
        config.resolve_endpoints();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RagEvalError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse a YAML document; absent keys keep their defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| RagEvalError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(milvus) = file_config.milvus {
            set(&mut config.milvus.host, milvus.host);
            set(&mut config.milvus.port, milvus.port);
            set(&mut config.milvus.user, milvus.user);
            set(&mut config.milvus.password, milvus.password);
            set(&mut config.milvus.database, milvus.database);
            set(&mut config.milvus.timeout_secs, milvus.timeout_secs);
        }

        if let Some(llm) = file_config.llm {
            llm.apply(&mut config.llm)?;
        }

        if let Some(judge) = file_config.judge {
            judge.apply(&mut config.judge)?;
        }

        if let Some(embedding) = file_config.embedding {
            if let Some(provider) = embedding.provider {
                config.embedding.provider = provider.parse()?;
            }
            set(&mut config.embedding.model, embedding.model);
            set(&mut config.embedding.api_key, embedding.api_key);
            set(&mut config.embedding.api_base, embedding.api_base);
            set(&mut config.embedding.ollama_base_url, embedding.ollama_base_url);
            config.embedding.dimensions = embedding.dimensions.or(config.embedding.dimensions);
            set(&mut config.embedding.batch_size, embedding.batch_size);
        }

        if let Some(ocr) = file_config.ocr {
            set(&mut config.ocr.model, ocr.model);
            set(&mut config.ocr.api_key, ocr.api_key);
            set(&mut config.ocr.api_base, ocr.api_base);
        }

        if let Some(rag) = file_config.rag {
            set(&mut config.rag.num_chunks, rag.num_chunks);
            set(&mut config.rag.chunk_size, rag.chunk_size);
            set(&mut config.rag.chunk_overlap, rag.chunk_overlap);
        }

        set(&mut config.deepinfra_base_url, file_config.deepinfra_base_url);

        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        set(&mut self.milvus.host, env_string("MILVUS_HOST"));
        set(&mut self.milvus.port, env_parse("MILVUS_PORT"));
        set(&mut self.milvus.user, env_string("MILVUS_USER"));
        set(&mut self.milvus.password, env_string("MILVUS_PASSWORD"));
        set(&mut self.milvus.database, env_string("MILVUS_DB"));

        if let Some(provider) = env_string("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        set(&mut self.llm.model, env_string("LLM_MODEL"));
        set(&mut self.llm.api_key, env_string("LLM_API_KEY"));
        set(&mut self.llm.api_base, env_string("LLM_API_BASE"));
        set(&mut self.llm.temperature, env_parse::<f32>("LLM_TEMPERATURE").map(Some));
        set(&mut self.llm.max_tokens, env_parse("LLM_MAX_TOKENS"));

        if let Some(provider) = env_string("JUDGE_PROVIDER") {
            self.judge.provider = provider.parse()?;
        }
        set(&mut self.judge.model, env_string("JUDGE_MODEL"));
        set(&mut self.judge.api_key, env_string("JUDGE_API_KEY"));
        set(&mut self.judge.api_base, env_string("JUDGE_API_BASE"));

        if let Some(provider) = env_string("EMBEDDING_PROVIDER") {
            self.embedding.provider = provider.parse()?;
        }
        set(&mut self.embedding.model, env_string("EMBEDDING_MODEL"));
        set(&mut self.embedding.api_key, env_string("EMBEDDING_API_KEY"));
        set(&mut self.embedding.api_base, env_string("EMBEDDING_API_BASE"));
        set(&mut self.embedding.ollama_base_url, env_string("OLLAMA_BASE_URL"));

        set(&mut self.ocr.model, env_string("OCR_MODEL"));
        set(&mut self.ocr.api_key, env_string("OCR_API_KEY"));
        set(&mut self.ocr.api_base, env_string("OCR_API_BASE"));

        set(&mut self.rag.num_chunks, env_parse("RAG_NUM_CHUNKS"));
        set(&mut self.rag.chunk_size, env_parse("RAG_CHUNK_SIZE"));
        set(&mut self.rag.chunk_overlap, env_parse("RAG_CHUNK_OVERLAP"));

        set(&mut self.deepinfra_base_url, env_string("DEEPINFRA_BASE_URL"));

        Ok(())
    }

    /// Fill the empty base URLs of DeepInfra-hosted roles with
    /// `deepinfra_base_url`. Explicit `api_base` values are left alone.
    pub fn resolve_endpoints(&mut self) {
        let deepinfra = self.deepinfra_base_url.clone();
        for llm in [&mut self.llm, &mut self.judge] {
            if llm.api_base.is_empty()
                && matches!(llm.provider, LlmProvider::DeepInfra | LlmProvider::CustomModels)
            {
                llm.api_base = deepinfra.clone();
            }
        }
        if self.embedding.api_base.is_empty()
            && matches!(
                self.embedding.provider,
                EmbeddingProvider::OpenAiCompatible | EmbeddingProvider::CustomModels
            )
        {
            self.embedding.api_base = deepinfra.clone();
        }
        if self.ocr.api_base.is_empty() {
            self.ocr.api_base = deepinfra;
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-evaluator")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Check that answer generation can run.
    pub fn validate_llm(&self) -> Result<()> {
        if self.llm.api_key.is_empty() {
            return Err(RagEvalError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable, add it to the config file, or select a custom inference model.".to_string(),
            ));
        }
        if self.llm.model.is_empty() {
            return Err(RagEvalError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Check that the judge can run.
    pub fn validate_judge(&self) -> Result<()> {
        if self.judge.api_key.is_empty() {
            return Err(RagEvalError::Config(format!(
                "{} API key is required for evaluation. Set JUDGE_API_KEY environment variable or add to config file.",
                self.judge.provider
            )));
        }
        if self.judge.provider == LlmProvider::Claude && !self.judge.api_key.starts_with("sk-") {
            return Err(RagEvalError::Config(
                "Invalid Claude API key format. Key should start with 'sk-'".to_string(),
            ));
        }
        Ok(())
    }

    /// Check that documents and queries can be embedded.
    pub fn validate_embedding(&self) -> Result<()> {
        if self.embedding.provider.requires_api_key() && self.embedding.api_key.is_empty() {
            return Err(RagEvalError::Config(format!(
                "{} API key is required for embeddings. Set EMBEDDING_API_KEY environment variable or add to config file.",
                self.embedding.provider
            )));
        }
        if self.embedding.model.is_empty() {
            return Err(RagEvalError::Config("Embedding model is required.".to_string()));
        }
        Ok(())
    }

    /// Check chunking and retrieval settings.
    pub fn validate_rag(&self) -> Result<()> {
        if self.rag.chunk_size == 0 {
            return Err(RagEvalError::Config("chunk_size must be positive".to_string()));
        }
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(RagEvalError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.rag.chunk_overlap, self.rag.chunk_size
            )));
        }
        if self.rag.num_chunks == 0 {
            return Err(RagEvalError::Config("num_chunks must be positive".to_string()));
        }
        Ok(())
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        provider: LlmProvider,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                provider,
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.api_key.is_empty());
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.judge.provider, LlmProvider::Claude);
        assert_eq!(config.judge.model, "claude-sonnet-4-20250514");
        assert_eq!(config.milvus.port, 19530);
        assert_eq!(config.rag.num_chunks, 5);
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(config.rag.chunk_overlap, 50);
    }

    #[test]
    fn test_validate_fails_without_required_fields() {
        let config = Config::default();
        assert!(config.validate_llm().is_err());
        assert!(config.validate_judge().is_err());
        assert!(config.validate_embedding().is_err());
    }

    #[test]
    fn test_claude_key_format() {
        let mut config = Config::default();
        config.judge.api_key = "not-a-claude-key".to_string();
        assert!(config.validate_judge().is_err());

        config.judge.api_key = "sk-ant-123".to_string();
        assert!(config.validate_judge().is_ok());
    }

    #[test]
    fn test_with_llm() {
        let config = Config::with_llm(LlmProvider::Groq, "test-key", "llama-3.1-70b");
        assert_eq!(config.llm.provider, LlmProvider::Groq);
        assert_eq!(config.llm.api_key, "test-key");
        assert_eq!(config.llm.base_url(), "https://api.groq.com/openai/v1");
        assert!(config.validate_llm().is_ok());
    }

    #[test]
    fn test_yaml_sections_override_defaults() {
        let yaml = r#"
milvus:
  host: milvus.internal
  port: 19531
judge:
  api_key: sk-test
embedding:
  provider: Ollama
  model: nomic-embed-text
rag:
  chunk_size: 500
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.milvus.host, "milvus.internal");
        assert_eq!(config.milvus.port, 19531);
        // Untouched judge fields keep the Claude defaults.
        assert_eq!(config.judge.provider, LlmProvider::Claude);
        assert_eq!(config.judge.api_key, "sk-test");
        assert_eq!(config.embedding.provider, EmbeddingProvider::Ollama);
        assert_eq!(config.rag.chunk_size, 500);
        assert_eq!(config.rag.chunk_overlap, 50);
    }

    #[test]
    fn test_deepinfra_base_url_reaches_hosted_roles() {
        let yaml = r#"
llm:
  provider: DeepInfra
judge:
  provider: Custom Models
  api_key: sk-test
embedding:
  provider: OpenAI-Compatible
deepinfra_base_url: https://proxy.example.com/v1/openai
"#;
        let mut config = Config::from_yaml(yaml).unwrap();
        config.resolve_endpoints();
        assert_eq!(config.llm.base_url(), "https://proxy.example.com/v1/openai");
        assert_eq!(config.judge.base_url(), "https://proxy.example.com/v1/openai");
        assert_eq!(config.embedding.api_base, "https://proxy.example.com/v1/openai");
        assert_eq!(
            config.ocr.to_llm_config().base_url(),
            "https://proxy.example.com/v1/openai"
        );

        let mut config = Config::default();
        config.deepinfra_base_url = "https://proxy.example.com/v1/openai".to_string();
        config.llm.provider = LlmProvider::DeepInfra;
        config.llm.api_base = "https://pinned.example.com/v1".to_string();
        config.resolve_endpoints();
        assert_eq!(config.llm.base_url(), "https://pinned.example.com/v1");
        // Claude is not hosted on DeepInfra.
        assert_eq!(config.judge.base_url(), "https://api.anthropic.com/v1");
    }

    #[test]
    fn test_ocr_leaves_temperature_to_provider() {
        let ocr = OcrConfig {
            model: "vision-model".to_string(),
            api_key: "key".to_string(),
            api_base: String::new(),
        };
        assert_eq!(ocr.to_llm_config().temperature, None);
        assert_eq!(LlmConfig::default().temperature, Some(0.1));
    }

    #[test]
    fn test_yaml_rejects_unknown_provider() {
        let yaml = "llm:\n  provider: Mystery\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rag_validation() {
        let mut config = Config::default();
        assert!(config.validate_rag().is_ok());
        config.rag.chunk_overlap = config.rag.chunk_size;
        assert!(config.validate_rag().is_err());
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("together".parse::<LlmProvider>().unwrap(), LlmProvider::TogetherAi);
        assert_eq!("Custom Models".parse::<LlmProvider>().unwrap(), LlmProvider::CustomModels);
        assert_eq!(
            "openai-compatible".parse::<EmbeddingProvider>().unwrap(),
            EmbeddingProvider::OpenAiCompatible
        );
    }

    #[test]
    fn test_milvus_endpoint_and_token() {
        let mut milvus = MilvusConfig {
            host: "localhost".to_string(),
            ..Default::default()
        };
        assert_eq!(milvus.endpoint(), "http://localhost:19530");
        assert!(milvus.token().is_none());

        milvus.user = "root".to_string();
        milvus.password = "Milvus".to_string();
        assert_eq!(milvus.token().as_deref(), Some("root:Milvus"));
    }
}
