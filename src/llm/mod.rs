//! LLM client for classification fallback and answer synthesis
//!
//! Speaks the OpenAI-compatible chat completions protocol, which covers
//! DeepSeek and most hosted providers. Calls are bounded by a request
//! timeout and retried once on transport errors; the client is optional
//! everywhere it is consumed, so a disabled or failing LLM degrades the
//! pipeline instead of breaking it.

use crate::config::LlmConfig;
use crate::error::{ChunavError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Completion backend consulted for low-confidence classifications and
/// free-text answer synthesis
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a prompt, returning the raw model text
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Provider and model identifier, for logs and stats
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// HTTP client for OpenAI-compatible chat completion endpoints
#[derive(Debug)]
pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl HttpLlmClient {
    /// Build a client from config; the API key comes from the environment
    /// variable named in `api_key_env`, never from the config file itself.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ChunavError::ServiceUnavailable {
                service: "llm".to_string(),
                message: format!("Environment variable {} is not set", config.api_key_env),
            }
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChunavError::ServiceUnavailable {
                service: "llm".to_string(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    async fn request_once(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChunavError::ServiceUnavailable {
                service: "llm".to_string(),
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChunavError::ServiceUnavailable {
                service: "llm".to_string(),
                message: format!("HTTP {}: {}", status, detail),
            });
        }

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| ChunavError::ServiceUnavailable {
                    service: "llm".to_string(),
                    message: format!("Malformed response: {}", e),
                })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ChunavError::ServiceUnavailable {
                service: "llm".to_string(),
                message: "Response contained no choices".to_string(),
            })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.request_once(prompt).await {
            Ok(text) => Ok(text),
            Err(first) => {
                // One retry covers transient transport failures; anything
                // persistent surfaces to the caller's degradation path.
                tracing::warn!("LLM request failed, retrying once: {}", first);
                self.request_once(prompt).await
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_service_unavailable() {
        let config = LlmConfig {
            enabled: true,
            provider: "deepseek".to_string(),
            base_url: "https://api.deepseek.com".to_string(),
            api_key_env: "CHUNAV_TEST_KEY_THAT_DOES_NOT_EXIST".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.0,
            timeout_secs: 30,
        };

        let err = HttpLlmClient::from_config(&config).unwrap_err();
        assert!(matches!(err, ChunavError::ServiceUnavailable { .. }));
    }

    #[test]
    fn test_base_url_trailing_slash_normalized() {
        std::env::set_var("CHUNAV_TEST_LLM_KEY", "test-key");
        let config = LlmConfig {
            enabled: true,
            provider: "deepseek".to_string(),
            base_url: "https://api.deepseek.com/".to_string(),
            api_key_env: "CHUNAV_TEST_LLM_KEY".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.0,
            timeout_secs: 30,
        };

        let client = HttpLlmClient::from_config(&config).unwrap();
        assert_eq!(client.base_url, "https://api.deepseek.com");
    }
}
