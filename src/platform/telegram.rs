use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tracing::{debug, info, warn};

use super::{ChatKind, InboundRequest};
use crate::relay::Relay;

const HELP_TEXT: &str = "Send me a YouTube or Instagram link and I'll reply with the video.\n\n\
     In groups I replace the link message with the video itself, \
     so give me the right to delete messages.";

/// Build an `InboundRequest` from a text message. Non-text and blank
/// messages are skipped.
fn to_request(msg: &Message) -> Option<InboundRequest> {
    let text = msg.text()?.trim().to_string();
    if text.is_empty() {
        return None;
    }

    let chat_kind = if msg.chat.is_group() || msg.chat.is_supergroup() {
        ChatKind::Group
    } else {
        ChatKind::Private
    };

    Some(InboundRequest {
        text,
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        chat_kind,
    })
}

/// Run the Telegram dispatcher until shutdown
pub async fn run(relay: Arc<Relay>, bot: Bot) -> Result<()> {
    info!("Starting Telegram platform...");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, relay: Arc<Relay>) -> ResponseResult<()> {
    let request = match to_request(&msg) {
        Some(request) => request,
        None => return Ok(()),
    };

    if let Some(command) = request.text.strip_prefix('/') {
        let command = command.split(['@', ' ']).next().unwrap_or_default();
        if command == "start" || command == "help" {
            if let Err(e) = bot.send_message(msg.chat.id, HELP_TEXT).await {
                warn!("Failed to send help: {}", e);
            }
        }
        return Ok(());
    }

    debug!(
        "Message {} in chat {} ({:?})",
        request.message_id, request.chat_id, request.chat_kind
    );

    // Each request gets its own task so a slow download never holds up
    // other updates, including later ones from the same chat.
    tokio::spawn(async move {
        relay.handle(request).await;
    });

    Ok(())
}
