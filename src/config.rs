//! Configuration types, read from the environment at startup.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmConfig, TranscriberConfig};

const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
const DEFAULT_LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_TRANSCRIBE_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TRANSCRIBE_MODEL: &str = "whisper-1";

/// Telegram bot settings. Absent when no token is configured.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Usernames or numeric ids; `*` allows everyone.
    pub allowed_users: Vec<String>,
}

/// Everything the bot needs to start.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram: Option<TelegramConfig>,
    pub llm: LlmConfig,
    /// Voice notes are rejected when this is `None`.
    pub transcriber: Option<TranscriberConfig>,
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
}

impl BotConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, treating blank values as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let telegram = get("TELEGRAM_BOT_TOKEN").map(|bot_token| TelegramConfig {
            bot_token,
            allowed_users: parse_list(&get("TELEGRAM_ALLOWED_USERS").unwrap_or_else(|| "*".into())),
        });

        let api_key = get("OPENROUTER_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".into()))?;
        let llm = LlmConfig {
            base_url: url_setting("ORGANIZER_LLM_BASE_URL", get("ORGANIZER_LLM_BASE_URL"), DEFAULT_LLM_BASE_URL)?,
            api_key: SecretString::from(api_key),
            model: get("ORGANIZER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
        };

        let transcriber = match get("TRANSCRIBE_API_KEY") {
            Some(key) => Some(TranscriberConfig {
                base_url: url_setting(
                    "TRANSCRIBE_BASE_URL",
                    get("TRANSCRIBE_BASE_URL"),
                    DEFAULT_TRANSCRIBE_BASE_URL,
                )?,
                api_key: SecretString::from(key),
                model: get("TRANSCRIBE_MODEL").unwrap_or_else(|| DEFAULT_TRANSCRIBE_MODEL.into()),
                language: get("TRANSCRIBE_LANGUAGE"),
            }),
            None => None,
        };

        Ok(Self {
            telegram,
            llm,
            transcriber,
            db_path: get("ORGANIZER_DB_PATH")
                .unwrap_or_else(|| "./data/organizer.db".into())
                .into(),
            log_dir: get("ORGANIZER_LOG_DIR").unwrap_or_else(|| "logs".into()).into(),
        })
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn url_setting(key: &str, value: Option<String>, default: &str) -> Result<String, ConfigError> {
    let url = value.unwrap_or_else(|| default.to_string());
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected an http(s) URL, got {url:?}"),
        });
    }
    Ok(url)
}
