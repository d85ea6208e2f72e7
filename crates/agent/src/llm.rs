use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use ema_core::config::{LlmConfig, LlmProvider};
use ema_core::{Message, Role};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::warn;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Text-generation service: full transcript in, one completion out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

pub fn client_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let http = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .build()
        .context("failed to build llm http client")?;
    let base_url = config.base_url.as_deref().map(|url| url.trim_end_matches('/'));

    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::OpenAi => Arc::new(ChatCompletionsClient {
            http,
            endpoint: format!("{}/chat/completions", base_url.unwrap_or(OPENAI_BASE_URL)),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        }),
        LlmProvider::Ollama => {
            let base_url =
                base_url.ok_or_else(|| anyhow!("llm.base_url is required for ollama provider"))?;
            Arc::new(ChatCompletionsClient {
                http,
                endpoint: format!("{base_url}/v1/chat/completions"),
                model: config.model.clone(),
                api_key: config.api_key.clone(),
                max_retries: config.max_retries,
            })
        }
        LlmProvider::Anthropic => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| anyhow!("llm.api_key is required for anthropic provider"))?;
            Arc::new(AnthropicClient {
                http,
                endpoint: format!("{}/messages", base_url.unwrap_or(ANTHROPIC_BASE_URL)),
                model: config.model.clone(),
                api_key,
                max_tokens: 4096,
                max_retries: config.max_retries,
            })
        }
    };

    Ok(client)
}

/// OpenAI-style `/chat/completions` endpoint (OpenAI, Ollama and compatibles).
pub struct ChatCompletionsClient {
    http: Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl ChatCompletionsClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            max_retries: 0,
        }
    }

    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": messages.iter().map(message_json).collect::<Vec<_>>(),
        });

        let data = send_with_retry(self.max_retries, || {
            let request = self.http.post(&self.endpoint).json(&payload);
            match &self.api_key {
                Some(api_key) => request.bearer_auth(api_key.expose_secret()),
                None => request,
            }
        })
        .await?;

        data.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("completion response has no choices[0].message.content"))
    }
}

/// Anthropic messages API. System messages are lifted into `system`.
pub struct AnthropicClient {
    http: Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
    max_tokens: u32,
    max_retries: u32,
}

impl AnthropicClient {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: SecretString,
    ) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            max_tokens: 4096,
            max_retries: 0,
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let system = messages
            .iter()
            .filter(|message| message.role() == Role::System)
            .map(Message::content)
            .collect::<Vec<_>>()
            .join("\n");
        let turns = messages
            .iter()
            .filter(|message| message.role() != Role::System)
            .map(message_json)
            .collect::<Vec<_>>();

        let payload = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": turns,
        });

        let data = send_with_retry(self.max_retries, || {
            self.http
                .post(&self.endpoint)
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&payload)
        })
        .await?;

        let blocks = data
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("anthropic response has no content array"))?;
        let text = blocks
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<String>();

        Ok(text)
    }
}

fn message_json(message: &Message) -> Value {
    json!({ "role": message.role().as_str(), "content": message.content() })
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn send_with_retry<F>(max_retries: u32, build: F) -> Result<Value>
where
    F: Fn() -> RequestBuilder + Send + Sync,
{
    let mut attempt: u32 = 0;

    loop {
        match build().send().await {
            Ok(response) if response.status().is_success() => {
                return response.json::<Value>().await.context("failed to decode llm response");
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if !is_retryable(status) || attempt >= max_retries {
                    bail!("llm request failed with status {status}: {body}");
                }
                warn!(
                    event_name = "llm.request.retry",
                    status = status.as_u16(),
                    attempt,
                    "retrying llm request"
                );
            }
            Err(error) => {
                if attempt >= max_retries {
                    return Err(error).context("llm request failed");
                }
                warn!(
                    event_name = "llm.request.retry",
                    error = %error,
                    attempt,
                    "retrying llm request"
                );
            }
        }

        attempt += 1;
        tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
    }
}

#[cfg(test)]
mod tests {
    use ema_core::config::{LlmConfig, LlmProvider};

    use super::client_from_config;

    fn config(provider: LlmProvider) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: None,
            base_url: None,
            model: "test-model".to_string(),
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    #[test]
    fn ollama_requires_base_url() {
        assert!(client_from_config(&config(LlmProvider::Ollama)).is_err());
    }

    #[test]
    fn anthropic_requires_api_key() {
        assert!(client_from_config(&config(LlmProvider::Anthropic)).is_err());
    }

    #[test]
    fn openai_falls_back_to_public_endpoint() {
        assert!(client_from_config(&config(LlmProvider::OpenAi)).is_ok());
    }
}
