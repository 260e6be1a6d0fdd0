//! Anthropic Messages API client, used for Claude judges.

use super::client::{LlmResponse, Message, Role, TokenUsage};
use super::{ChatModel, api_error, connection_error, with_retries};
use crate::config::LlmConfig;
use crate::error::{RagEvalError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Claude client.
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    config: LlmConfig,
}

impl AnthropicClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagEvalError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/messages", self.config.base_url().trim_end_matches('/'))
    }

    /// System messages move to the top-level `system` field; the rest keep
    /// their order.
    fn build_request<'a>(&'a self, messages: &[Message]) -> MessagesRequest<'a> {
        let mut system = Vec::new();
        let mut turns = Vec::new();
        for message in messages {
            match message.role {
                Role::System => system.push(message.content.text()),
                Role::User => turns.push(AnthropicMessage {
                    role: "user",
                    content: message.content.text(),
                }),
                Role::Assistant => turns.push(AnthropicMessage {
                    role: "assistant",
                    content: message.content.text(),
                }),
            }
        }

        MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: if system.is_empty() {
                None
            } else {
                Some(system.join("\n\n"))
            },
            messages: turns,
        }
    }

    async fn send_once(&self, messages: &[Message]) -> Result<LlmResponse> {
        let provider = self.config.provider.label();
        let request = self.build_request(messages);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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

        let parsed: MessagesResponse = serde_json::from_str(&body)?;
        Ok(Self::into_response(parsed))
    }

    fn into_response(parsed: MessagesResponse) -> LlmResponse {
        let content = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        LlmResponse {
            content,
            finish_reason: parsed.stop_reason,
            usage: parsed.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            }),
        }
    }
}

#[async_trait]
impl ChatModel for AnthropicClient {
    async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        with_retries(self.config.max_retries, "Claude request", || {
            self.send_once(&messages)
        })
        .await
    }

    fn describe(&self) -> String {
        self.config.display_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AnthropicClient {
        AnthropicClient::new(LlmConfig {
            api_key: "sk-ant-test".to_string(),
            ..LlmConfig::judge_default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_uses_messages_api() {
        assert_eq!(client().endpoint(), "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn test_system_prompt_is_lifted_out() {
        let client = client();
        let messages = vec![
            Message::system("Be strict."),
            Message::user("Score this."),
            Message::assistant("Sure."),
        ];
        let json = serde_json::to_value(client.build_request(&messages)).unwrap();
        assert_eq!(json["system"], "Be strict.");
        assert_eq!(json["messages"].as_array().unwrap().len(), 2);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][1]["role"], "assistant");
        assert_eq!(json["model"], "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_text_blocks_are_concatenated() {
        let body = r#"{
            "content": [
                {"type": "text", "text": "{\"overall_score\": "},
                {"type": "text", "text": "7}"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(body).unwrap();
        let response = AnthropicClient::into_response(parsed);
        assert_eq!(response.content, "{\"overall_score\": 7}");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }
}
