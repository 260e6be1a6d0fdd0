//! Built-in model catalog, default metrics and naming helpers.

use crate::config::{Config, EmbeddingProvider};
use rand::Rng;

/// Collection used when the user has not created one of their own.
pub const DEFAULT_COLLECTION: &str = "rag_collection_eerrur_8415";

/// Default OpenAI-compatible base URL for DeepInfra, overridden by
/// `Config::deepinfra_base_url`.
pub const DEEPINFRA_BASE_URL: &str = "https://api.deepinfra.com/v1/openai";

/// Providers offered when selecting a custom model.
pub const CUSTOM_MODEL_PROVIDERS: &[&str] = &["DeepInfra"];

/// Base URL for a provider listed in [`CUSTOM_MODEL_PROVIDERS`].
pub fn provider_base_url<'a>(provider: &str, config: &'a Config) -> Option<&'a str> {
    match provider {
        "DeepInfra" => Some(&config.deepinfra_base_url),
        _ => None,
    }
}

/// Model-name fragments identifying models that only accept the default
/// temperature and use `max_completion_tokens`.
pub const FIXED_TEMPERATURE_MODELS: &[&str] = &["gpt-5", "o1-preview", "o1-mini", "o1"];

/// Whether `model` only accepts the default temperature of 1.0.
pub fn is_fixed_temperature_model(model: &str) -> bool {
    let lower = model.to_lowercase();
    FIXED_TEMPERATURE_MODELS.iter().any(|m| lower.contains(m))
}

/// Description of a known embedding model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddingModelInfo {
    pub provider: EmbeddingProvider,
    pub name: &'static str,
    pub dimensions: usize,
    pub description: &'static str,
    pub requires_api_key: bool,
}

const fn model(
    provider: EmbeddingProvider,
    name: &'static str,
    dimensions: usize,
    description: &'static str,
    requires_api_key: bool,
) -> EmbeddingModelInfo {
    EmbeddingModelInfo {
        provider,
        name,
        dimensions,
        description,
        requires_api_key,
    }
}

/// Known embedding models. Each one needs its own collection because the
/// vector dimension is fixed when a collection is created.
pub const EMBEDDING_MODELS: &[EmbeddingModelInfo] = &[
    model(EmbeddingProvider::OpenAi, "text-embedding-3-large", 3072, "Highest quality OpenAI embeddings", true),
    model(EmbeddingProvider::OpenAi, "text-embedding-3-small", 1536, "Cost-effective OpenAI embeddings", true),
    model(EmbeddingProvider::OpenAiCompatible, "Qwen/Qwen3-Embedding-8B", 4096, "Qwen3 8B embeddings via OpenAI-compatible API (e.g., DeepInfra)", true),
    model(EmbeddingProvider::HuggingFace, "BAAI/bge-large-en-v1.5", 1024, "High quality open-source embeddings", false),
    model(EmbeddingProvider::HuggingFace, "sentence-transformers/all-MiniLM-L6-v2", 384, "Fast, lightweight embeddings", false),
    model(EmbeddingProvider::HuggingFace, "intfloat/e5-large-v2", 1024, "State-of-the-art open-source embeddings", false),
    model(EmbeddingProvider::SentenceTransformers, "all-MiniLM-L6-v2", 384, "Fast local embeddings", false),
    model(EmbeddingProvider::SentenceTransformers, "all-mpnet-base-v2", 768, "High quality local embeddings", false),
    model(EmbeddingProvider::Ollama, "nomic-embed-text", 768, "Nomic embeddings via Ollama", false),
    model(EmbeddingProvider::Ollama, "llama2", 4096, "Llama 2 embeddings via Ollama", false),
    model(EmbeddingProvider::Ollama, "mistral", 4096, "Mistral embeddings via Ollama", false),
];

/// Look up a catalog entry by provider and model name.
pub fn embedding_model(provider: EmbeddingProvider, name: &str) -> Option<&'static EmbeddingModelInfo> {
    EMBEDDING_MODELS
        .iter()
        .find(|m| m.provider == provider && m.name == name)
}

/// Id, display name and judge-facing description of the built-in metrics.
pub const DEFAULT_METRICS: &[(&str, &str, &str)] = &[
    (
        "answer_relevancy",
        "Answer Relevancy",
        "Determines whether an LLM output is able to address the given input in an informative and concise manner. The response should directly answer the question without unnecessary information.",
    ),
    (
        "task_completion",
        "Task Completion",
        "Determines whether an LLM agent is able to complete the task it was set out to do. Evaluate if all aspects of the requested task have been addressed.",
    ),
    (
        "correctness",
        "Correctness",
        "Determines whether an LLM output is factually correct based on the provided ground truth. Compare the response against the ground truth for accuracy.",
    ),
    (
        "hallucination",
        "Hallucination",
        "Determines whether an LLM output contains fake or made-up information not supported by the context or ground truth. Check for fabricated facts or unsupported claims.",
    ),
    (
        "contextual_relevancy",
        "Contextual Relevancy",
        "Determines whether the retriever in a RAG-based LLM system is able to extract the most relevant information for your LLM as context. Evaluate if the retrieved chunks are pertinent to the question.",
    ),
    (
        "responsible_metrics",
        "Responsible Metrics",
        "Includes metrics such as bias and toxicity, which determines whether an LLM output contains harmful, offensive, or biased content.",
    ),
    (
        "task_specific",
        "Task-Specific Metrics",
        "Includes metrics such as summarization quality, format adherence, or other custom criteria depending on the specific use-case.",
    ),
    (
        "engagement",
        "Engagement / User Satisfaction",
        "Evaluates the usefulness, engaging nature, and overall user satisfaction potential of the response. Consider clarity, helpfulness, user-friendliness, and how well it maintains conversation flow with the chat history.",
    ),
];

/// Generate a fresh collection name like `rag_collection_abcdef_1234`.
pub fn generate_collection_name() -> String {
    let mut rng = rand::thread_rng();
    let letters: String = (0..6)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect();
    let number: u32 = rng.gen_range(1000..=9999);
    format!("rag_collection_{}_{}", letters, number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_temperature_detection() {
        assert!(is_fixed_temperature_model("gpt-5-mini"));
        assert!(is_fixed_temperature_model("O1-preview"));
        assert!(!is_fixed_temperature_model("gpt-4o"));
        assert!(!is_fixed_temperature_model("llama-3.1-70b"));
    }

    #[test]
    fn test_generated_collection_name_shape() {
        let name = generate_collection_name();
        let parts: Vec<&str> = name.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "rag");
        assert_eq!(parts[1], "collection");
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_lowercase()));
        let number: u32 = parts[3].parse().unwrap();
        assert!((1000..=9999).contains(&number));
    }

    #[test]
    fn test_catalog_lookup() {
        let info = embedding_model(EmbeddingProvider::OpenAi, "text-embedding-3-small").unwrap();
        assert_eq!(info.dimensions, 1536);
        assert!(embedding_model(EmbeddingProvider::Ollama, "text-embedding-3-small").is_none());
    }

    #[test]
    fn test_default_metric_ids_are_unique() {
        let mut ids: Vec<&str> = DEFAULT_METRICS.iter().map(|(id, _, _)| *id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), DEFAULT_METRICS.len());
    }
}
