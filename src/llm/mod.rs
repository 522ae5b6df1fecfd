//! LLM integration for the organizer.
//!
//! Chat completions go to an OpenAI-compatible endpoint (OpenRouter by
//! default); voice notes go to a Whisper-style transcription endpoint.

pub mod openrouter;
pub mod provider;
pub mod transcriber;

pub use openrouter::OpenRouterProvider;
pub use provider::*;
pub use transcriber::{Transcriber, WhisperTranscriber};

use std::sync::Arc;

use secrecy::SecretString;

use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
}

/// Configuration for the voice transcriber.
#[derive(Debug, Clone)]
pub struct TranscriberConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub language: Option<String>,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenRouterProvider::new(&config.base_url, config.api_key.clone(), &config.model)?;
    tracing::info!("Using {} (model: {})", config.base_url, config.model);
    Ok(Arc::new(provider))
}

/// Create the voice transcriber from configuration.
pub fn create_transcriber(config: &TranscriberConfig) -> Result<Arc<dyn Transcriber>, LlmError> {
    let transcriber = WhisperTranscriber::new(
        &config.base_url,
        config.api_key.clone(),
        &config.model,
        config.language.clone(),
    )?;
    tracing::info!("Voice transcription enabled (model: {})", config.model);
    Ok(Arc::new(transcriber))
}
