//! Telegram channel: long-polls the Bot API for text and voice messages.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde_json::Value;

use crate::channels::{
    Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate, VoiceNote,
};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const API_BASE: &str = "https://api.telegram.org";

/// Telegram channel backed by `getUpdates` long-polling.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{API_BASE}/bot{}/{method}", self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{API_BASE}/file/bot{}/{file_path}", self.bot_token)
    }

    /// Check if a username or id is in the allowed list.
    pub fn is_user_allowed(&self, identity: &str) -> bool {
        check_user_allowed(&self.allowed_users, [identity])
    }

    /// Check if any of the provided identities is allowed.
    pub fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        check_user_allowed(&self.allowed_users, identities)
    }

    /// Send a text message, splitting it at Telegram's length limit.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    /// Send one chunk as plain text. Replies carry user-entered names, which
    /// would break Markdown parsing.
    async fn send_message_chunk(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
            }))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendMessage returned {status}: {body}"),
            });
        }
        Ok(())
    }

    /// Resolve a file id through `getFile` and download its bytes.
    async fn fetch_file(&self, file_id: &str) -> anyhow::Result<Vec<u8>> {
        let data: Value = self
            .client
            .post(self.api_url("getFile"))
            .json(&serde_json::json!({ "file_id": file_id }))
            .send()
            .await
            .context("getFile request failed")?
            .json()
            .await
            .context("getFile returned invalid JSON")?;

        let file_path = data
            .pointer("/result/file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("getFile response has no file_path: {data}"))?;

        let resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .context("file download failed")?
            .error_for_status()
            .context("file download rejected")?;
        let bytes = resp.bytes().await.context("file body unreadable")?;
        Ok(bytes.to_vec())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };
                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update, &allowed_users) else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = chat_id(&msg.metadata).ok_or_else(|| ChannelError::SendFailed {
            name: "telegram".into(),
            reason: "No chat_id in message metadata".into(),
        })?;

        self.send_message(chat_id, &response.content).await
    }

    async fn send_status(
        &self,
        status: StatusUpdate,
        metadata: &Value,
    ) -> Result<(), ChannelError> {
        let Some(chat_id) = chat_id(metadata) else {
            return Ok(());
        };
        match status {
            StatusUpdate::Thinking(_) => {
                let _ = self
                    .client
                    .post(self.api_url("sendChatAction"))
                    .json(&serde_json::json!({
                        "chat_id": chat_id,
                        "action": "typing"
                    }))
                    .send()
                    .await;
            }
            StatusUpdate::Transcript(text) => {
                self.send_message(chat_id, &format!("Transcript: {text}"))
                    .await?;
            }
            StatusUpdate::Status(msg) if !msg.is_empty() => {
                self.send_message(chat_id, &msg).await?;
            }
            StatusUpdate::Status(_) => {}
        }
        Ok(())
    }

    async fn download_voice(&self, msg: &IncomingMessage) -> Result<Vec<u8>, ChannelError> {
        let note = msg
            .voice
            .as_ref()
            .ok_or_else(|| ChannelError::InvalidMessage("message has no voice note".into()))?;

        let audio = self
            .fetch_file(&note.file_id)
            .await
            .map_err(|e| ChannelError::DownloadFailed {
                name: "telegram".into(),
                reason: format!("{e:#}"),
            })?;
        tracing::debug!(file_id = %note.file_id, bytes = audio.len(), "Voice note downloaded");
        Ok(audio)
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn chat_id(metadata: &Value) -> Option<&str> {
    metadata.get("chat_id").and_then(Value::as_str)
}

/// Turn one `getUpdates` entry into an inbound message.
///
/// Returns `None` for updates without a text or voice message and for
/// senders outside the allowlist.
fn parse_update(update: &Value, allowed_users: &[String]) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let from = message.get("from");

    let username = from
        .and_then(|f| f.get("username"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string());

    let is_allowed = {
        let mut identities = vec![username];
        if let Some(ref id) = user_id {
            identities.push(id.as_str());
        }
        check_user_allowed(allowed_users, identities)
    };
    if !is_allowed {
        tracing::warn!(
            "Telegram: ignoring message from unauthorized user: username={username}, user_id={}",
            user_id.as_deref().unwrap_or("unknown")
        );
        return None;
    }

    // Without a numeric id the sender cannot be registered.
    let user_id = user_id?;

    let mut incoming = if let Some(text) = message.get("text").and_then(Value::as_str) {
        IncomingMessage::new("telegram", &user_id, text)
    } else if let Some(voice) = message.get("voice") {
        let note = VoiceNote {
            file_id: voice.get("file_id").and_then(Value::as_str)?.to_string(),
            duration_secs: voice
                .get("duration")
                .and_then(Value::as_u64)
                .and_then(|d| u32::try_from(d).ok()),
            mime_type: voice
                .get("mime_type")
                .and_then(Value::as_str)
                .map(String::from),
        };
        IncomingMessage::voice("telegram", &user_id, note)
    } else {
        return None;
    };

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_default();
    incoming = incoming.with_metadata(serde_json::json!({
        "chat_id": chat_id,
        "username": username,
    }));

    if let Some(first) = from.and_then(|f| f.get("first_name")).and_then(Value::as_str) {
        incoming = incoming.with_user_name(first);
    }
    if let Some(last) = from.and_then(|f| f.get("last_name")).and_then(Value::as_str) {
        incoming = incoming.with_last_name(last);
    }
    Some(incoming)
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(cut);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { cut } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn everyone() -> Vec<String> {
        vec!["*".into()]
    }

    #[test]
    fn telegram_channel_name() {
        let ch = TelegramChannel::new("fake-token".into(), everyone());
        assert_eq!(ch.name(), "telegram");
    }

    #[test]
    fn telegram_api_and_file_urls() {
        let ch = TelegramChannel::new("123:ABC".into(), vec![]);
        assert_eq!(ch.api_url("getMe"), "https://api.telegram.org/bot123:ABC/getMe");
        assert_eq!(
            ch.file_url("voice/file_7.oga"),
            "https://api.telegram.org/file/bot123:ABC/voice/file_7.oga"
        );
    }

    // ── User allowlist tests ────────────────────────────────────────

    #[test]
    fn telegram_user_allowed_wildcard() {
        let ch = TelegramChannel::new("t".into(), everyone());
        assert!(ch.is_user_allowed("anyone"));
    }

    #[test]
    fn telegram_user_allowed_specific() {
        let ch = TelegramChannel::new("t".into(), vec!["alice".into(), "bob".into()]);
        assert!(ch.is_user_allowed("alice"));
        assert!(!ch.is_user_allowed("eve"));
    }

    #[test]
    fn telegram_user_denied_empty() {
        let ch = TelegramChannel::new("t".into(), vec![]);
        assert!(!ch.is_user_allowed("anyone"));
    }

    #[test]
    fn telegram_user_exact_match_not_substring() {
        let ch = TelegramChannel::new("t".into(), vec!["alice".into()]);
        assert!(!ch.is_user_allowed("alice_bot"));
        assert!(!ch.is_user_allowed("malice"));
    }

    #[test]
    fn telegram_user_allowed_by_numeric_id_identity() {
        let ch = TelegramChannel::new("t".into(), vec!["123456789".into()]);
        assert!(ch.is_any_user_allowed(["unknown", "123456789"]));
        assert!(!ch.is_any_user_allowed(["unknown", "987"]));
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn parses_text_message_with_names_and_chat() {
        let update = serde_json::json!({
            "update_id": 10,
            "message": {
                "from": {"id": 42, "username": "ann", "first_name": "Ann", "last_name": "Lee"},
                "chat": {"id": 777},
                "text": "Buy milk tomorrow"
            }
        });
        let msg = parse_update(&update, &everyone()).unwrap();
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.user_id, "42");
        assert_eq!(msg.content, "Buy milk tomorrow");
        assert_eq!(msg.user_name.as_deref(), Some("Ann"));
        assert_eq!(msg.last_name.as_deref(), Some("Lee"));
        assert_eq!(chat_id(&msg.metadata), Some("777"));
        assert!(msg.voice.is_none());
    }

    #[test]
    fn parses_voice_message() {
        let update = serde_json::json!({
            "update_id": 11,
            "message": {
                "from": {"id": 42, "first_name": "Ann"},
                "chat": {"id": 777},
                "voice": {"file_id": "AwACAgIAAxk", "duration": 4, "mime_type": "audio/ogg"}
            }
        });
        let msg = parse_update(&update, &everyone()).unwrap();
        assert!(msg.content.is_empty());
        let note = msg.voice.unwrap();
        assert_eq!(note.file_id, "AwACAgIAAxk");
        assert_eq!(note.duration_secs, Some(4));
        assert_eq!(note.mime_type.as_deref(), Some("audio/ogg"));
    }

    #[test]
    fn skips_unsupported_and_unauthorized_updates() {
        let sticker = serde_json::json!({
            "update_id": 12,
            "message": {"from": {"id": 42}, "chat": {"id": 1}, "sticker": {"file_id": "x"}}
        });
        assert!(parse_update(&sticker, &everyone()).is_none());

        let text = serde_json::json!({
            "update_id": 13,
            "message": {"from": {"id": 42, "username": "eve"}, "chat": {"id": 1}, "text": "hi"}
        });
        assert!(parse_update(&text, &["alice".to_string()]).is_none());
        assert!(parse_update(&text, &["42".to_string()]).is_some());

        let edited = serde_json::json!({"update_id": 14, "edited_message": {}});
        assert!(parse_update(&edited, &everyone()).is_none());
    }

    #[tokio::test]
    async fn download_without_voice_is_invalid() {
        let ch = TelegramChannel::new("t".into(), everyone());
        let msg = IncomingMessage::new("telegram", "42", "text only");
        let err = ch.download_voice(&msg).await.unwrap_err();
        assert!(matches!(err, ChannelError::InvalidMessage(_)));
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        // Two-byte characters: byte 4096 would fall mid-character at odd limits.
        let msg = "é".repeat(3000);
        let chunks = split_message(&msg, 4095);
        assert_eq!(chunks.concat(), msg);
        assert!(chunks.iter().all(|c| c.len() <= 4095));
    }
}
