//! Daemon - the long-running relay service
//!
//! Connects the Telegram channel, polls for messages and runs each one
//! through the voice relay on its own task until interrupted.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::backend::{ApiClient, OpenAiBackend};
use crate::channels::{BotCommand, Channel, IncomingMessage, TelegramChannel};
use crate::relay::{VoiceRelay, ensure_temp_dir};
use crate::{Config, Result};

/// The relay daemon
#[derive(Debug)]
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Build the speech backend described by `config`
    #[must_use]
    pub fn backend(config: &Config) -> OpenAiBackend {
        let api = ApiClient::new(&config.openai_base_url, &config.api_key);
        OpenAiBackend::new(&api, &config.voice, config.assistant.clone())
    }

    /// Commands advertised in Telegram's command menu
    #[must_use]
    pub fn bot_commands() -> Vec<BotCommand> {
        vec![
            BotCommand::new("start", "Introduce the bot"),
            BotCommand::new("help", "How to use the bot"),
        ]
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the temp directory cannot be created or the bot
    /// token is rejected
    pub async fn run(self) -> Result<()> {
        ensure_temp_dir(&self.config.temp_dir).await?;
        tracing::info!(path = %self.config.temp_dir.display(), "temp directory ready");

        let (telegram, rx) = TelegramChannel::with_receiver(&self.config.bot_token);
        let mut telegram = telegram.with_api_base(&self.config.telegram_api_base);
        telegram.connect().await?;

        if let Err(e) = telegram.sync_commands(&Self::bot_commands()).await {
            tracing::warn!(error = %e, "failed to register bot commands");
        }

        let polling = telegram.start_polling(self.config.updates_interval)?;

        let backend = Arc::new(Self::backend(&self.config));
        let relay = Arc::new(VoiceRelay::new(
            Arc::new(telegram.clone()),
            backend,
            self.config.temp_dir.clone(),
            self.config.relay.clone(),
        ));

        // Set up shutdown signal
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        tracing::info!(
            scope = ?self.config.assistant.session_scope,
            "voice relay ready - send the bot a voice message"
        );

        let handled = serve(relay, rx, shutdown_rx).await;

        polling.abort();
        telegram.disconnect().await?;

        tracing::info!(handled, "daemon stopped");
        Ok(())
    }
}

/// Dispatch inbound messages until shutdown or until the stream ends
///
/// Each message runs on its own task, so a failure or panic in one request
/// never reaches another. On shutdown, in-flight requests are aborted; when
/// the stream ends, they are allowed to finish. Returns the number of
/// messages dispatched.
pub async fn serve(
    relay: Arc<VoiceRelay>,
    mut messages: mpsc::Receiver<IncomingMessage>,
    mut shutdown: mpsc::Receiver<()>,
) -> usize {
    let mut tasks = JoinSet::new();
    let mut dispatched = 0;

    loop {
        tokio::select! {
            Some(()) = shutdown.recv() => {
                tracing::info!(in_flight = tasks.len(), "shutdown requested");
                tasks.shutdown().await;
                return dispatched;
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined
                    && e.is_panic()
                {
                    tracing::error!(error = %e, "message task panicked");
                }
            }
            message = messages.recv() => {
                let Some(message) = message else {
                    tracing::info!(in_flight = tasks.len(), "message stream closed");
                    break;
                };
                tracing::debug!(
                    chat_id = %message.channel_id,
                    message_id = %message.id,
                    "message received"
                );
                let relay = Arc::clone(&relay);
                tasks.spawn(async move {
                    let outcome = relay.dispatch(&message).await;
                    tracing::debug!(message_id = %message.id, ?outcome, "message handled");
                });
                dispatched += 1;
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined
            && e.is_panic()
        {
            tracing::error!(error = %e, "message task panicked");
        }
    }
    dispatched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertises_start_and_help() {
        let names: Vec<String> = Daemon::bot_commands()
            .into_iter()
            .map(|c| c.command)
            .collect();
        assert_eq!(names, ["start", "help"]);
    }
}
