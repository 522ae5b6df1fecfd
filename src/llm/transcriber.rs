//! Speech-to-text for voice notes via an OpenAI-compatible
//! `audio/transcriptions` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::info;

use crate::error::LlmError;

const PROVIDER: &str = "transcriber";

/// Turns recorded audio into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe `audio` (the raw file bytes, e.g. Telegram's OGG/Opus).
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, LlmError>;
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper-style transcription over HTTP.
pub struct WhisperTranscriber {
    client: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    language: Option<String>,
}

impl WhisperTranscriber {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        model: &str,
        language: Option<String>,
    ) -> Result<Self, LlmError> {
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
            language,
        })
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, LlmError> {
        let size = audio.len();
        let part = Part::bytes(audio).file_name(file_name.to_string());
        let mut form = Form::new()
            .text("model", self.model.clone())
            .part("file", part);
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let resp = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: TranscriptionResponse =
            resp.json().await.map_err(|e| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;
        let text = parsed.text.trim().to_string();
        info!(bytes = size, chars = text.len(), "Voice note transcribed");
        Ok(text)
    }
}
