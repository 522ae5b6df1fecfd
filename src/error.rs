//! Error types for the organizer bot.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DatabaseError {
    /// Classify a libsql error raised by `op`, splitting out constraint failures.
    pub fn from_libsql(op: &str, err: libsql::Error) -> Self {
        let message = err.to_string();
        if message.contains("constraint failed") {
            Self::Constraint(format!("{op}: {message}"))
        } else {
            Self::Query(format!("{op}: {message}"))
        }
    }
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to download attachment on channel {name}: {reason}")]
    DownloadFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// LLM and speech provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while turning a message into organizer mutations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Execution failed, nothing was saved: {0}")]
    Execution(DatabaseError),

    #[error("Datastore unavailable: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Unknown user with chat id {0}")]
    UnknownUser(i64),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_convert_into_pipeline_storage() {
        let err: PipelineError = DatabaseError::Query("boom".into()).into();
        assert!(matches!(err, PipelineError::Storage(DatabaseError::Query(_))));
    }

    #[test]
    fn top_level_error_wraps_each_layer() {
        let config: Error = ConfigError::MissingEnvVar("OPENROUTER_API_KEY".into()).into();
        assert_eq!(
            config.to_string(),
            "Configuration error: Missing required environment variable: OPENROUTER_API_KEY"
        );

        let pipeline: Error = PipelineError::UnknownUser(7).into();
        assert_eq!(pipeline.to_string(), "Pipeline error: Unknown user with chat id 7");

        let result: Result<()> = Err(ChannelError::InvalidMessage("empty".into()).into());
        assert!(matches!(result, Err(Error::Channel(_))));
    }
}
