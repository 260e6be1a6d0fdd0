//! OpenAI-compatible LLM client.
//!
//! This client works with any OpenAI-compatible API endpoint: OpenAI itself,
//! Groq, Together AI, DeepInfra and self-hosted proxies.

use super::{ChatModel, api_error, connection_error, with_retries};
use crate::catalog::is_fixed_temperature_model;
use crate::config::LlmConfig;
use crate::error::{RagEvalError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

/// Plain text, or a list of parts for vision requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl MessageContent {
    /// The text of this content; image parts are skipped.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// A user message carrying a prompt and a PNG image (base64, no prefix).
    pub fn user_with_png(prompt: impl Into<String>, png_base64: &str) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: prompt.into(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{}", png_base64),
                    },
                },
            ]),
        }
    }
}

/// Request body for chat completion.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Response from chat completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Response from an LLM call including metadata.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated content.
    pub content: String,
    /// Reason the model stopped generating.
    pub finish_reason: Option<String>,
    /// Token usage (if available).
    pub usage: Option<TokenUsage>,
}

#[derive(Debug)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// OpenAI-compatible LLM client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagEvalError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Get the API endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.config.base_url().trim_end_matches('/');
        format!("{}/chat/completions", base)
    }

    /// Models such as GPT-5 and the o1 family only accept temperature 1.0
    /// and take `max_completion_tokens` instead of `max_tokens`.
    fn uses_fixed_temperature(&self) -> bool {
        self.config.fixed_temperature || is_fixed_temperature_model(&self.config.model)
    }

    fn build_request<'a>(&'a self, messages: &'a [Message]) -> ChatCompletionRequest<'a> {
        if self.uses_fixed_temperature() {
            ChatCompletionRequest {
                model: &self.config.model,
                messages,
                max_tokens: None,
                max_completion_tokens: Some(self.config.max_tokens),
                temperature: Some(1.0),
            }
        } else {
            ChatCompletionRequest {
                model: &self.config.model,
                messages,
                max_tokens: Some(self.config.max_tokens),
                max_completion_tokens: None,
                temperature: self.config.temperature,
            }
        }
    }

    async fn send_once(&self, messages: &[Message]) -> Result<LlmResponse> {
        let provider = self.config.provider.label();
        let request = self.build_request(messages);

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| connection_error(provider, e))?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(api_error(provider, status, &message));
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body)?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RagEvalError::LlmApi("No choices in response".to_string()))?;

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            usage: completion.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        let response = with_retries(self.config.max_retries, "chat completion", || {
            self.send_once(&messages)
        })
        .await?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                model = %self.config.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "chat completion finished"
            );
        }
        Ok(response)
    }

    fn describe(&self) -> String {
        self.config.display_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;

    fn config(base: &str, model: &str) -> LlmConfig {
        LlmConfig {
            provider: LlmProvider::OpenAi,
            api_base: base.to_string(),
            api_key: "test".to_string(),
            model: model.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_message_creation() {
        let sys = Message::system("You are helpful.");
        let user = Message::user("Hello!");
        let assistant = Message::assistant("Hi there!");

        assert_eq!(sys.role, Role::System);
        assert_eq!(user.role, Role::User);
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(user.content.text(), "Hello!");
    }

    #[test]
    fn test_endpoint_construction() {
        let client = LlmClient::new(config("https://api.example.com/v1/", "gpt-4o")).unwrap();
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");

        let client2 = LlmClient::new(config("", "gpt-4o")).unwrap();
        assert_eq!(client2.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_fixed_temperature_request() {
        let client = LlmClient::new(config("", "gpt-5")).unwrap();
        let messages = vec![Message::user("hi")];
        let json = serde_json::to_value(client.build_request(&messages)).unwrap();
        assert_eq!(json["temperature"], 1.0);
        assert_eq!(json["max_completion_tokens"], 4096);
        assert!(json.get("max_tokens").is_none());

        let client = LlmClient::new(config("", "gpt-4o")).unwrap();
        let json = serde_json::to_value(client.build_request(&messages)).unwrap();
        assert!((json["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert_eq!(json["max_tokens"], 4096);
        assert!(json.get("max_completion_tokens").is_none());
    }

    #[test]
    fn test_unset_temperature_is_omitted() {
        let mut cfg = config("", "vision-model");
        cfg.temperature = None;
        let client = LlmClient::new(cfg).unwrap();
        let messages = vec![Message::user_with_png("Read this", "AAAA")];
        let json = serde_json::to_value(client.build_request(&messages)).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["max_tokens"], 4096);
    }

    #[test]
    fn test_vision_message_shape() {
        let message = Message::user_with_png("Read this", "AAAA");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(
            json["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
    }
}
