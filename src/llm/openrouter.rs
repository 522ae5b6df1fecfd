//! OpenAI-compatible chat completions over HTTP (OpenRouter by default).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, error, info};

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};

const PROVIDER: &str = "openrouter";

pub struct OpenRouterProvider {
    client: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl OpenRouterProvider {
    pub fn new(base_url: &str, api_key: SecretString, model: &str) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

/// Pull the first choice out of a chat-completions response body.
fn parse_completion(data: &Value) -> Result<CompletionResponse, LlmError> {
    let choice = data["choices"]
        .get(0)
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: "No choices in response".to_string(),
        })?;
    let content = choice["message"]["content"]
        .as_str()
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: "Choice has no text content".to_string(),
        })?
        .to_string();

    let usage = &data["usage"];
    Ok(CompletionResponse {
        content,
        input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
        finish_reason: FinishReason::from_api(choice["finish_reason"].as_str()),
    })
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);
        info!(model = %self.model, url = %url, "Calling LLM API");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: format!("Failed to read response body: {e}"),
        })?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LlmError::AuthFailed {
                provider: PROVIDER.to_string(),
            });
        }
        if !status.is_success() {
            error!(status = %status, "Provider API error: {}", text);
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {status}: {text}"),
            });
        }

        let data: Value = serde_json::from_str(&text)?;
        let response = parse_completion(&data)?;
        debug!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "LLM call complete"
        );
        Ok(response)
    }
}
