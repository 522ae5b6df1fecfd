use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use voice_organizer::answers::SchemaRegistry;
use voice_organizer::assistant::Assistant;
use voice_organizer::channels::{Channel, CliChannel, OutgoingResponse, TelegramChannel};
use voice_organizer::config::BotConfig;
use voice_organizer::llm::{create_provider, create_transcriber};
use voice_organizer::pipeline::CommandPipeline;
use voice_organizer::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::from_env().context("invalid configuration")?;

    // Console plus a daily-rolling log file; the guard flushes on exit.
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "voice-organizer.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    eprintln!("Voice organizer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);

    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .context("failed to open database")?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    let llm = create_provider(&config.llm)?;
    let transcriber = match &config.transcriber {
        Some(tc) => Some(create_transcriber(tc)?),
        None => {
            eprintln!("   Voice: disabled (TRANSCRIBE_API_KEY not set)");
            None
        }
    };

    let registry = Arc::new(SchemaRegistry::standard());
    let pipeline = CommandPipeline::new(registry, llm);
    let assistant = Arc::new(Assistant::new(Arc::clone(&db), pipeline, transcriber));

    let channel: Arc<dyn Channel> = match &config.telegram {
        Some(tg) => {
            eprintln!(
                "   Telegram: enabled (allowed: {})",
                if tg.allowed_users.iter().any(|u| u == "*") {
                    "everyone".to_string()
                } else {
                    tg.allowed_users.join(", ")
                }
            );
            Arc::new(TelegramChannel::new(
                tg.bot_token.clone(),
                tg.allowed_users.clone(),
            ))
        }
        None => {
            eprintln!("   Channel: cli (set TELEGRAM_BOT_TOKEN to run the bot)");
            eprintln!("   Type /start, then a command. Ctrl+D to exit.\n");
            Arc::new(CliChannel::new())
        }
    };

    channel
        .health_check()
        .await
        .with_context(|| format!("{} channel is not reachable", channel.name()))?;
    let mut messages = channel.start().await?;
    tracing::info!(channel = channel.name(), "Organizer ready and listening");

    loop {
        let message = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down...");
                break;
            }
            msg = messages.next() => match msg {
                Some(m) => m,
                None => {
                    tracing::info!("Channel stream ended, shutting down...");
                    break;
                }
            }
        };

        // One task per message; each gets its own datastore session.
        let assistant = Arc::clone(&assistant);
        let channel = Arc::clone(&channel);
        tokio::spawn(async move {
            let reply = assistant.handle(channel.as_ref(), &message).await;
            if let Err(e) = channel
                .respond(&message, OutgoingResponse::text(reply))
                .await
            {
                tracing::error!(message_id = %message.id, error = %e, "Failed to send reply");
            }
        });
    }

    channel.shutdown().await?;
    Ok(())
}
