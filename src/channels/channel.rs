//! Channel trait and the message types every channel speaks.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;

/// Stream of inbound messages produced by a started channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A recorded voice note attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceNote {
    /// Channel-native handle used to download the audio.
    pub file_id: String,
    pub duration_secs: Option<u32>,
    pub mime_type: Option<String>,
}

/// Unified inbound message from any channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Source channel: "telegram" or "cli".
    pub channel: String,
    /// Channel-native sender id (a Telegram numeric id, as text).
    pub user_id: String,
    pub user_name: Option<String>,
    pub last_name: Option<String>,
    /// Message text. Empty for a voice note.
    pub content: String,
    pub voice: Option<VoiceNote>,
    /// Channel-specific data needed to reply (chat ids and the like).
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            user_name: None,
            last_name: None,
            content: content.to_string(),
            voice: None,
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    /// A voice note with no text body.
    pub fn voice(channel: &str, user_id: &str, note: VoiceNote) -> Self {
        let mut msg = Self::new(channel, user_id, "");
        msg.voice = Some(note);
        msg
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_name = Some(name.to_string());
        self
    }

    pub fn with_last_name(mut self, name: &str) -> Self {
        self.last_name = Some(name.to_string());
        self
    }

    /// The sender id as a number, when the channel uses numeric ids.
    pub fn numeric_user_id(&self) -> Option<i64> {
        self.user_id.parse().ok()
    }
}

/// A reply going back out through a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingResponse {
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// Progress notices sent while a message is being handled.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// Work in progress, e.g. waiting on the model.
    Thinking(String),
    /// What the speech recognizer heard.
    Transcript(String),
    Status(String),
}

/// A source of user messages and a sink for replies.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving. Messages arrive on the returned stream until the
    /// channel shuts down.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn send_status(
        &self,
        status: StatusUpdate,
        metadata: &serde_json::Value,
    ) -> Result<(), ChannelError>;

    /// Fetch the audio of a voice note carried by `msg`.
    async fn download_voice(&self, msg: &IncomingMessage) -> Result<Vec<u8>, ChannelError> {
        let _ = msg;
        Err(ChannelError::DownloadFailed {
            name: self.name().to_string(),
            reason: "voice notes are not supported on this channel".into(),
        })
    }

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_user_id_parses_telegram_ids() {
        let msg = IncomingMessage::new("telegram", "123456789", "hi");
        assert_eq!(msg.numeric_user_id(), Some(123456789));
        let named = IncomingMessage::new("cli", "local-user", "hi");
        assert_eq!(named.numeric_user_id(), None);
    }

    #[test]
    fn voice_message_has_empty_content() {
        let note = VoiceNote {
            file_id: "AwAC".into(),
            duration_secs: Some(3),
            mime_type: Some("audio/ogg".into()),
        };
        let msg = IncomingMessage::voice("telegram", "42", note.clone())
            .with_user_name("Ann")
            .with_last_name("Lee");
        assert!(msg.content.is_empty());
        assert_eq!(msg.voice, Some(note));
        assert_eq!(msg.user_name.as_deref(), Some("Ann"));
        assert_eq!(msg.last_name.as_deref(), Some("Lee"));
    }

    #[test]
    fn messages_get_distinct_ids() {
        let a = IncomingMessage::new("cli", "0", "a");
        let b = IncomingMessage::new("cli", "0", "a");
        assert_ne!(a.id, b.id);
    }
}
