pub mod telegram;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Chat-level identifiers, kept platform-neutral
pub type ChatId = i64;
pub type MessageId = i32;

/// How a failed transport call should be treated by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection-level failure (reset, DNS, TLS)
    Network,
    Timeout,
    /// Server asked us to slow down
    RateLimited,
    /// The server refused the content itself (too large, malformed)
    PayloadRejected,
    /// Missing rights, e.g. deleting someone else's message without admin
    Permission,
    Other,
}

impl TransportErrorKind {
    /// Failures a retry of the very same call can plausibly fix
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            TransportErrorKind::Network
                | TransportErrorKind::Timeout
                | TransportErrorKind::RateLimited
        )
    }

    /// Failures a retry of the very same call cannot fix
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransportErrorKind::PayloadRejected | TransportErrorKind::Permission
        )
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {detail}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub detail: String,
    /// Minimum wait the server demanded before the next call
    pub retry_after: Option<Duration>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: Duration, detail: impl Into<String>) -> Self {
        Self {
            retry_after: Some(retry_after),
            ..Self::new(TransportErrorKind::RateLimited, detail)
        }
    }
}

/// Outbound side of the chat platform
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId, TransportError>;

    async fn send_video(
        &self,
        chat: ChatId,
        path: &Path,
        caption: &str,
    ) -> Result<MessageId, TransportError>;

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<(), TransportError>;
}
