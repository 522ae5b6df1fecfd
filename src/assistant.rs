//! Per-message orchestration: user resolution, bot commands, voice notes
//! and free-form organizer commands.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::channels::{Channel, IncomingMessage, StatusUpdate};
use crate::error::{DatabaseError, PipelineError};
use crate::llm::Transcriber;
use crate::organizer::User;
use crate::pipeline::{CommandPipeline, render_failure};
use crate::store::Database;

const HELP: &str = "Send me a text or voice command, e.g. \"remind me to buy milk tomorrow\".\n\
Commands:\n/tasks - list your tasks\n/next <id> - move a task to its next status\n\
/prev <id> - move a task back to its previous status";

/// What one inbound message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Tasks,
    /// Cycle a task's status; `forward` picks the direction.
    Cycle { id: i64, forward: bool },
    /// A bot command with missing or malformed arguments.
    Usage(&'static str),
    Unknown(String),
    Voice,
    Text(String),
}

impl Command {
    pub fn parse(msg: &IncomingMessage) -> Self {
        if msg.voice.is_some() {
            return Command::Voice;
        }
        let text = msg.content.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return Command::Text(text.to_string());
        };

        let mut parts = rest.split_whitespace();
        // Telegram appends "@botname" to commands in group chats.
        let name = parts
            .next()
            .unwrap_or_default()
            .split('@')
            .next()
            .unwrap_or_default();
        let arg = parts.next();
        match name {
            "start" => Command::Start,
            "help" => Command::Help,
            "tasks" => Command::Tasks,
            "next" | "prev" => {
                let forward = name == "next";
                match arg.and_then(|a| a.parse().ok()) {
                    Some(id) => Command::Cycle { id, forward },
                    None if forward => Command::Usage("Usage: /next <task id>"),
                    None => Command::Usage("Usage: /prev <task id>"),
                }
            }
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// Handles one message end to end and produces the reply text.
pub struct Assistant {
    db: Arc<dyn Database>,
    pipeline: CommandPipeline,
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl Assistant {
    pub fn new(
        db: Arc<dyn Database>,
        pipeline: CommandPipeline,
        transcriber: Option<Arc<dyn Transcriber>>,
    ) -> Self {
        Self {
            db,
            pipeline,
            transcriber,
        }
    }

    /// Process `msg` and return the reply to send back on `channel`.
    ///
    /// Never fails: every error becomes a user-facing message and a log line.
    pub async fn handle(&self, channel: &dyn Channel, msg: &IncomingMessage) -> String {
        let Some(tg_id) = msg.numeric_user_id() else {
            warn!(channel = %msg.channel, user = %msg.user_id, "Sender has no numeric id");
            return "Sorry, I cannot identify you on this channel.".to_string();
        };

        let command = Command::parse(msg);
        if command == Command::Start {
            return self.register(tg_id, msg).await;
        }

        let user = match self.db.get_user_by_tg_id(tg_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(tg_id, "Message from unregistered user");
                return render_failure(&PipelineError::UnknownUser(tg_id));
            }
            Err(e) => {
                error!(tg_id, error = %e, "User lookup failed");
                return render_failure(&PipelineError::Storage(e));
            }
        };

        match command {
            Command::Start => self.register(tg_id, msg).await,
            Command::Help => HELP.to_string(),
            Command::Tasks => self.list_tasks(&user).await,
            Command::Cycle { id, forward } => self.cycle_status(&user, id, forward).await,
            Command::Usage(usage) => usage.to_string(),
            Command::Unknown(name) => format!("Unknown command /{name}.\n{HELP}"),
            Command::Voice => match self.transcribe(channel, msg).await {
                Ok(text) => self.organize(channel, msg, &user, &text).await,
                Err(e) => {
                    warn!(tg_id, error = %e, "Voice note not transcribed");
                    render_failure(&e)
                }
            },
            Command::Text(text) if text.is_empty() => HELP.to_string(),
            Command::Text(text) => self.organize(channel, msg, &user, &text).await,
        }
    }

    async fn register(&self, tg_id: i64, msg: &IncomingMessage) -> String {
        match self
            .db
            .upsert_user(tg_id, msg.user_name.as_deref(), msg.last_name.as_deref())
            .await
        {
            Ok(user) => {
                info!(tg_id, user_id = user.id, "User registered");
                let name = user.name.as_deref().unwrap_or("there");
                format!("Hello, {name}! I'm ready to help organize your tasks.\n{HELP}")
            }
            Err(e) => {
                error!(tg_id, error = %e, "Registration failed");
                render_failure(&PipelineError::Storage(e))
            }
        }
    }

    async fn list_tasks(&self, user: &User) -> String {
        let tasks = match self.db.list_tasks(user.id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(user_id = user.id, error = %e, "Listing tasks failed");
                return render_failure(&PipelineError::Storage(e));
            }
        };
        info!(user_id = user.id, count = tasks.len(), "Tasks listed");
        if tasks.is_empty() {
            return "You have no tasks yet. Send a text or voice command to create one."
                .to_string();
        }

        let mut out = String::from("Your tasks:");
        for task in &tasks {
            let _ = write!(out, "\n#{} {} ({})", task.id, task.name, task.status);
            if let Some(deadline) = task.deadline {
                let _ = write!(out, ", due {deadline}");
            }
            match self.db.list_subtasks(task.id).await {
                Ok(subtasks) => {
                    for sub in subtasks {
                        let mark = if sub.is_done { "x" } else { " " };
                        let _ = write!(out, "\n    [{mark}] {}", sub.name);
                    }
                }
                Err(e) => warn!(task_id = task.id, error = %e, "Listing subtasks failed"),
            }
        }
        out
    }

    async fn cycle_status(&self, user: &User, id: i64, forward: bool) -> String {
        match self.db.cycle_task_status(user.id, id, forward).await {
            Ok(status) => {
                info!(user_id = user.id, task_id = id, %status, "Task status changed");
                format!("Task #{id} is now {status}.")
            }
            Err(DatabaseError::NotFound { .. }) => format!("Task with id={id} does not exist"),
            Err(e) => {
                error!(user_id = user.id, task_id = id, error = %e, "Status change failed");
                render_failure(&PipelineError::Storage(e))
            }
        }
    }

    /// Download and transcribe a voice note, echoing the transcript.
    async fn transcribe(
        &self,
        channel: &dyn Channel,
        msg: &IncomingMessage,
    ) -> Result<String, PipelineError> {
        let Some(transcriber) = &self.transcriber else {
            return Err(PipelineError::Transcription(
                "voice transcription is not configured".into(),
            ));
        };

        let _ = channel
            .send_status(StatusUpdate::Thinking("Listening...".into()), &msg.metadata)
            .await;
        let audio = channel
            .download_voice(msg)
            .await
            .map_err(|e| PipelineError::Transcription(e.to_string()))?;
        let text = transcriber
            .transcribe(audio, "voice.ogg")
            .await
            .map_err(|e| PipelineError::Transcription(e.to_string()))?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(PipelineError::Transcription("empty transcript".into()));
        }

        info!(chars = text.len(), "Voice note transcribed");
        if let Err(e) = channel
            .send_status(StatusUpdate::Transcript(text.clone()), &msg.metadata)
            .await
        {
            warn!(error = %e, "Could not echo transcript");
        }
        Ok(text)
    }

    async fn organize(
        &self,
        channel: &dyn Channel,
        msg: &IncomingMessage,
        user: &User,
        text: &str,
    ) -> String {
        let _ = channel
            .send_status(StatusUpdate::Thinking("Working on it...".into()), &msg.metadata)
            .await;
        match self.pipeline.run(self.db.as_ref(), user.id, text).await {
            Ok(outcome) => outcome.reply(),
            Err(e) => {
                error!(user_id = user.id, error = %e, "Command failed");
                render_failure(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::SchemaRegistry;
    use crate::channels::{MessageStream, OutgoingResponse, VoiceNote};
    use crate::error::{ChannelError, LlmError};
    use crate::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
    use crate::store::LibSqlBackend;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct FixedLlm(String);

    #[async_trait]
    impl LlmProvider for FixedLlm {
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.0.clone(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    struct FixedTranscriber(&'static str);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, audio: Vec<u8>, _file_name: &str) -> Result<String, LlmError> {
            assert_eq!(audio, b"OggS".to_vec());
            Ok(self.0.to_string())
        }
    }

    /// Records status updates; serves a fixed voice payload.
    #[derive(Default)]
    struct RecordingChannel {
        statuses: Mutex<Vec<StatusUpdate>>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "test"
        }
        async fn start(&self) -> Result<MessageStream, ChannelError> {
            Ok(Box::pin(futures::stream::empty()))
        }
        async fn respond(&self, _msg: &IncomingMessage, _r: OutgoingResponse) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn send_status(&self, status: StatusUpdate, _m: &serde_json::Value) -> Result<(), ChannelError> {
            self.statuses.lock().await.push(status);
            Ok(())
        }
        async fn download_voice(&self, _msg: &IncomingMessage) -> Result<Vec<u8>, ChannelError> {
            Ok(b"OggS".to_vec())
        }
        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn shutdown(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    async fn assistant(answer: &str, transcriber: Option<Arc<dyn Transcriber>>) -> Assistant {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let pipeline = CommandPipeline::new(
            Arc::new(SchemaRegistry::standard()),
            Arc::new(FixedLlm(answer.to_string())),
        );
        Assistant::new(db, pipeline, transcriber)
    }

    fn text(body: &str) -> IncomingMessage {
        IncomingMessage::new("test", "42", body).with_user_name("Ann")
    }

    const ADD_TASK: &str = "```json\n{\"result\":\"SUCCESS\",\"response\":{\"to_add\":{\"tasks\":[{\"name\":\"Buy milk\"}]}}}\n```";

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse(&text("/start")), Command::Start);
        assert_eq!(Command::parse(&text("/tasks@organizer_bot")), Command::Tasks);
        assert_eq!(
            Command::parse(&text("/next 12")),
            Command::Cycle { id: 12, forward: true }
        );
        assert_eq!(
            Command::parse(&text("/prev 3")),
            Command::Cycle { id: 3, forward: false }
        );
        assert_eq!(Command::parse(&text("/next abc")), Command::Usage("Usage: /next <task id>"));
        assert_eq!(Command::parse(&text("/frobnicate")), Command::Unknown("frobnicate".into()));
        assert_eq!(Command::parse(&text("  buy milk ")), Command::Text("buy milk".into()));
        let voice = IncomingMessage::voice(
            "test",
            "42",
            VoiceNote { file_id: "f".into(), duration_secs: None, mime_type: None },
        );
        assert_eq!(Command::parse(&voice), Command::Voice);
    }

    #[tokio::test]
    async fn unregistered_user_is_asked_to_start() {
        let a = assistant(ADD_TASK, None).await;
        let ch = RecordingChannel::default();
        assert_eq!(a.handle(&ch, &text("buy milk")).await, "Please send /start first.");
        assert!(ch.statuses.lock().await.is_empty());
    }

    #[tokio::test]
    async fn start_then_text_command_adds_task() {
        let a = assistant(ADD_TASK, None).await;
        let ch = RecordingChannel::default();
        let greeting = a.handle(&ch, &text("/start")).await;
        assert!(greeting.starts_with("Hello, Ann!"));

        let reply = a.handle(&ch, &text("buy milk")).await;
        assert_eq!(reply, "Done:\nAdded (1):\n- Task: Buy milk");

        let listing = a.handle(&ch, &text("/tasks")).await;
        assert!(listing.starts_with("Your tasks:\n#"));
        assert!(listing.contains("Buy milk (NEW)"));
    }

    #[tokio::test]
    async fn status_commands_cycle_and_report_missing() {
        let a = assistant(ADD_TASK, None).await;
        let ch = RecordingChannel::default();
        a.handle(&ch, &text("/start")).await;
        a.handle(&ch, &text("buy milk")).await;
        let user = a.db.get_user_by_tg_id(42).await.unwrap().unwrap();
        let task = a.db.list_tasks(user.id).await.unwrap().remove(0);

        let next = a.handle(&ch, &text(&format!("/next {}", task.id))).await;
        assert_eq!(next, format!("Task #{} is now IN_PROGRESS.", task.id));
        let prev = a.handle(&ch, &text(&format!("/prev {}", task.id))).await;
        assert_eq!(prev, format!("Task #{} is now NEW.", task.id));
        assert_eq!(a.handle(&ch, &text("/next 999")).await, "Task with id=999 does not exist");
    }

    #[tokio::test]
    async fn voice_note_is_transcribed_and_echoed() {
        let a = assistant(ADD_TASK, Some(Arc::new(FixedTranscriber(" buy milk ")))).await;
        let ch = RecordingChannel::default();
        a.handle(&ch, &text("/start")).await;
        let voice = IncomingMessage::voice(
            "test",
            "42",
            VoiceNote { file_id: "f".into(), duration_secs: Some(2), mime_type: None },
        );
        let reply = a.handle(&ch, &voice).await;
        assert_eq!(reply, "Done:\nAdded (1):\n- Task: Buy milk");
        let statuses = ch.statuses.lock().await;
        assert!(statuses.contains(&StatusUpdate::Transcript("buy milk".into())));
    }

    #[tokio::test]
    async fn voice_without_transcriber_is_reported() {
        let a = assistant(ADD_TASK, None).await;
        let ch = RecordingChannel::default();
        a.handle(&ch, &text("/start")).await;
        let voice = IncomingMessage::voice(
            "test",
            "42",
            VoiceNote { file_id: "f".into(), duration_secs: None, mime_type: None },
        );
        let reply = a.handle(&ch, &voice).await;
        assert_eq!(reply, "Sorry, I could not recognize that voice message.");
    }

    #[tokio::test]
    async fn non_numeric_sender_is_rejected() {
        let a = assistant(ADD_TASK, None).await;
        let ch = RecordingChannel::default();
        let msg = IncomingMessage::new("test", "someone", "/start");
        assert!(a.handle(&ch, &msg).await.contains("cannot identify"));
    }
}
