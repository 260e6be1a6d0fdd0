//! LLM integration module.
//!
//! Provides an OpenAI-compatible client (OpenAI, Groq, Together AI, DeepInfra
//! and custom endpoints), an Anthropic client for Claude, and the prompts
//! used for answer generation and OCR.

mod anthropic;
mod client;
mod prompts;

pub use anthropic::AnthropicClient;
pub use client::{LlmClient, LlmResponse, Message, MessageContent, Role, TokenUsage};
pub use prompts::{Prompts, fill};

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{RagEvalError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;

/// Anything that can turn a conversation into a reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send a conversation and return the reply.
    async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse>;

    /// `"<provider> - <model>"`.
    fn describe(&self) -> String;

    /// Convenience method: single user message with optional system prompt.
    async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(user));

        let response = self.chat(messages).await?;
        Ok(response.content)
    }

    /// Test connectivity to the API.
    async fn test_connection(&self) -> Result<()> {
        let reply = self
            .complete(None, "Say 'hello' and nothing else.")
            .await?;
        if reply.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(RagEvalError::LlmApi(format!("Unexpected response: {}", reply)))
        }
    }
}

/// Build the chat model for a provider configuration.
pub fn create_chat_model(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    if config.model.is_empty() {
        return Err(RagEvalError::Config(format!(
            "No model configured for provider {}",
            config.provider
        )));
    }
    match config.provider {
        LlmProvider::Claude => Ok(Box::new(AnthropicClient::new(config.clone())?)),
        _ => Ok(Box::new(LlmClient::new(config.clone())?)),
    }
}

/// Delay before retry number `attempt` (0-based): 1s, 2s, 4s, ... capped at 30s.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs((1u64 << attempt.min(5)).min(30))
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
pub(crate) async fn with_retries<T, F, Fut>(max_retries: u32, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_retries => {
                let delay = backoff_delay(attempt);
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    what,
                    attempt + 1,
                    max_retries + 1,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Map a non-success HTTP status to a user-facing error.
pub(crate) fn api_error(provider: &str, status: StatusCode, message: &str) -> RagEvalError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RagEvalError::Authentication(format!(
            "Invalid {} API key. Please check your API key. ({})",
            provider, message
        )),
        StatusCode::TOO_MANY_REQUESTS => RagEvalError::RateLimit(message.to_string()),
        s if s.is_server_error() => {
            RagEvalError::Http(format!("{} API error ({}): {}", provider, s, message))
        }
        s => RagEvalError::LlmApi(format!("{} API error ({}): {}", provider, s, message)),
    }
}

/// Wrap a transport failure with a checklist for the user.
pub(crate) fn connection_error(provider: &str, err: reqwest::Error) -> RagEvalError {
    if err.is_connect() || err.is_timeout() {
        RagEvalError::Connection(format!(
            "Failed to connect to {provider} API. Please check:\n\
             1. Your API key is valid\n\
             2. Your network connection\n\
             3. {provider} API service status\n({err})"
        ))
    } else {
        RagEvalError::from(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn test_api_error_classification() {
        assert!(matches!(
            api_error("OpenAI", StatusCode::UNAUTHORIZED, "bad key"),
            RagEvalError::Authentication(_)
        ));
        assert!(matches!(
            api_error("OpenAI", StatusCode::TOO_MANY_REQUESTS, "slow down"),
            RagEvalError::RateLimit(_)
        ));
        assert!(api_error("OpenAI", StatusCode::BAD_GATEWAY, "oops").is_transient());
        assert!(!api_error("OpenAI", StatusCode::BAD_REQUEST, "bad").is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retries_recovers_from_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retries(2, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RagEvalError::RateLimit("429".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retries_stops_on_permanent_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries(5, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RagEvalError::Authentication("nope".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_create_chat_model_requires_model() {
        let config = LlmConfig {
            model: String::new(),
            ..Default::default()
        };
        assert!(create_chat_model(&config).is_err());
    }
}
