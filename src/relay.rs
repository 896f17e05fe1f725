use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::classify::{classify, ClassifiedUrl};
use crate::delivery::{send_with_retries, DeliveryFailureKind, DeliveryOutcome, RetryPolicy};
use crate::fetch::{FetchExecutor, FetchedVideo};
use crate::platform::{ChatKind, InboundRequest};
use crate::transport::{ChatId, ChatTransport, MessageId};

pub const STATUS_TEXT: &str = "Downloading the video… this may take a while ⏳";
pub const FETCH_FAILED_TEXT: &str = "Couldn't download the video. Try another link.";
pub const DEFAULT_CAPTION: &str = "Video";

/// Telegram's caption limit
const MAX_CAPTION_CHARS: usize = 1024;

pub fn fallback_text(url: &str) -> String {
    format!(
        "Couldn't send the video (it may be too large). Here's the link: {}",
        url
    )
}

/// The "working…" notification posted while a request is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusHandle {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// How an orchestration cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    /// No URL, or a URL we don't fetch from
    Ignored,
    FetchFailed,
    Delivered,
    /// The video didn't go through; the link was offered instead
    FellBack { reason: DeliveryFailureKind },
    /// The fetch/deliver stage panicked
    Aborted,
}

/// Per-message orchestration: classify, acknowledge, fetch, deliver, clean up.
pub struct Relay {
    transport: Box<dyn ChatTransport>,
    fetcher: FetchExecutor,
    retry: RetryPolicy,
}

impl Relay {
    pub fn new(
        transport: Box<dyn ChatTransport>,
        fetcher: FetchExecutor,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            fetcher,
            retry,
        }
    }

    /// Run one orchestration cycle. Never fails: every error is handled and
    /// reported to the chat inside the cycle.
    pub async fn handle(&self, request: InboundRequest) -> CycleReport {
        let Some(classified) = classify(&request.text) else {
            return CycleReport::Ignored;
        };
        if !classified.platform.is_supported() {
            debug!("Ignoring unsupported link {}", classified.url);
            return CycleReport::Ignored;
        }

        let span = tracing::info_span!(
            "relay",
            request_id = %Uuid::new_v4(),
            chat_id = request.chat_id,
            platform = %classified.platform,
        );
        self.run_cycle(&request, &classified).instrument(span).await
    }

    async fn run_cycle(&self, request: &InboundRequest, classified: &ClassifiedUrl) -> CycleReport {
        info!("Relaying {}", classified.url);

        if request.chat_kind == ChatKind::Group {
            if let Err(e) = self
                .transport
                .delete_message(request.chat_id, request.message_id)
                .await
            {
                debug!("Could not delete the original message: {}", e);
            }
        }

        let status = match self.transport.send_text(request.chat_id, STATUS_TEXT).await {
            Ok(message_id) => Some(StatusHandle {
                chat_id: request.chat_id,
                message_id,
            }),
            Err(e) => {
                debug!("Could not post status message: {}", e);
                None
            }
        };

        let cycle = self.fetch_and_deliver(request.chat_id, &classified.url);
        let report = match AssertUnwindSafe(cycle).catch_unwind().await {
            Ok(report) => report,
            Err(_) => {
                error!("Relay cycle panicked for {}", classified.url);
                CycleReport::Aborted
            }
        };

        if let Some(status) = status {
            if let Err(e) = self
                .transport
                .delete_message(status.chat_id, status.message_id)
                .await
            {
                debug!("Could not remove status message: {}", e);
            }
        }

        info!("Relay cycle finished: {:?}", report);
        report
    }

    async fn fetch_and_deliver(&self, chat: ChatId, url: &str) -> CycleReport {
        let video = match self.fetcher.fetch(url).await {
            Ok(video) => video,
            Err(e) => {
                warn!("Fetch failed: {}", e);
                let outcome = send_with_retries(&self.retry, "send-text", || {
                    self.transport.send_text(chat, FETCH_FAILED_TEXT)
                })
                .await;
                if let DeliveryOutcome::DeliveryFailed { detail, .. } = outcome {
                    warn!("Could not report the fetch failure: {}", detail);
                }
                return CycleReport::FetchFailed;
            }
        };

        // From here on the work dir is deleted on every exit path, unwinding included.
        let FetchedVideo {
            path,
            title,
            artifact,
        } = video;
        let caption = caption_for(title.as_deref());

        let outcome = send_with_retries(&self.retry, "send-video", || {
            self.transport.send_video(chat, &path, &caption)
        })
        .await;

        let report = match outcome {
            DeliveryOutcome::Delivered => CycleReport::Delivered,
            DeliveryOutcome::DeliveryFailed { kind, detail } => {
                warn!("Video delivery failed ({:?}): {}", kind, detail);
                let text = fallback_text(url);
                let fallback = send_with_retries(&self.retry, "send-text", || {
                    self.transport.send_text(chat, &text)
                })
                .await;
                if let DeliveryOutcome::DeliveryFailed { detail, .. } = fallback {
                    warn!("Fallback link delivery failed: {}", detail);
                }
                CycleReport::FellBack { reason: kind }
            }
        };

        artifact.cleanup();
        report
    }
}

fn caption_for(title: Option<&str>) -> String {
    let title = title.map(str::trim).filter(|t| !t.is_empty()).unwrap_or(DEFAULT_CAPTION);
    title.chars().take(MAX_CAPTION_CHARS).collect()
}
