use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId as TgChatId, InputFile, MessageId as TgMessageId};
use teloxide::RequestError;
use tracing::debug;

use super::{ChatId, ChatTransport, MessageId, TransportError, TransportErrorKind};
use crate::config::TelegramConfig;

/// Build a bot whose HTTP client honours the configured timeouts
pub fn build_bot(config: &TelegramConfig) -> Result<Bot> {
    let client = reqwest::Client::builder()
        .tcp_nodelay(true)
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .pool_idle_timeout(config.pool_timeout())
        .build()
        .context("Failed to build Telegram HTTP client")?;
    Ok(Bot::with_client(&config.bot_token, client))
}

/// `ChatTransport` backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId, TransportError> {
        let sent = self
            .bot
            .send_message(TgChatId(chat), text)
            .await
            .map_err(classify_error)?;
        Ok(sent.id.0)
    }

    async fn send_video(
        &self,
        chat: ChatId,
        path: &Path,
        caption: &str,
    ) -> Result<MessageId, TransportError> {
        debug!("Uploading {} to chat {}", path.display(), chat);
        let sent = self
            .bot
            .send_video(TgChatId(chat), InputFile::file(path.to_path_buf()))
            .caption(caption)
            .await
            .map_err(classify_error)?;
        Ok(sent.id.0)
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<(), TransportError> {
        self.bot
            .delete_message(TgChatId(chat), TgMessageId(message))
            .await
            .map_err(classify_error)?;
        Ok(())
    }
}

/// Map a teloxide error onto the transport taxonomy
fn classify_error(err: RequestError) -> TransportError {
    let kind = match &err {
        RequestError::Network(e) if e.is_timeout() => TransportErrorKind::Timeout,
        RequestError::Network(_) => TransportErrorKind::Network,
        RequestError::RetryAfter(after) => {
            return TransportError::rate_limited(after.duration(), err.to_string())
        }
        RequestError::Api(api) => classify_api_description(&api.to_string()),
        _ => TransportErrorKind::Other,
    };
    TransportError::new(kind, err.to_string())
}

/// Telegram reports API failures as free-form descriptions
fn classify_api_description(description: &str) -> TransportErrorKind {
    let lower = description.to_lowercase();
    if lower.contains("forbidden")
        || lower.contains("not enough rights")
        || lower.contains("can't be deleted")
        || lower.contains("have no rights")
    {
        TransportErrorKind::Permission
    } else if lower.contains("request entity too large")
        || lower.contains("too big")
        || lower.contains("bad request")
    {
        TransportErrorKind::PayloadRejected
    } else {
        TransportErrorKind::Other
    }
}
