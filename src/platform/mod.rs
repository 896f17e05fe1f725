pub mod telegram;

use crate::transport::{ChatId, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    /// Groups and supergroups
    Group,
}

/// A text message received from the chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    pub text: String,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub chat_kind: ChatKind,
}
