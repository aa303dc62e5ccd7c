//! Control events exchanged between the members of a team.

use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

/// Events published on team topics.
///
/// The group topic carries `Start`, `Response` and `Reset` to every member.
/// `RequestPublish` is only sent to a single participant topic. The output
/// topic carries `Start`, `Message` and `Termination` to the collector.
///
/// A participant turn yields exactly one `Response` on the group topic, even
/// when it produced nothing, and one `Message` per reply on the output topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GroupChatEvent {
    /// A run begins, optionally with a task message
    Start { message: Option<ChatMessage> },
    /// A participant produced a message
    Message { message: ChatMessage },
    /// Everything a participant said in one turn
    Response { messages: Vec<ChatMessage> },
    /// The conversation stopped; the message content is the stop reason
    Termination { message: ChatMessage },
    /// The receiving participant should take its turn
    RequestPublish,
    /// Clear all per-run state
    Reset,
}

impl GroupChatEvent {
    /// Short name of the event kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Message { .. } => "message",
            Self::Response { .. } => "response",
            Self::Termination { .. } => "termination",
            Self::RequestPublish => "request_publish",
            Self::Reset => "reset",
        }
    }
}

impl std::fmt::Display for GroupChatEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start { message: Some(m) } => write!(f, "start {}", m),
            Self::Message { message } | Self::Termination { message } => {
                write!(f, "{} {}", self.kind(), message)
            }
            Self::Response { messages } => write!(f, "response ({} messages)", messages.len()),
            _ => write!(f, "{}", self.kind()),
        }
    }
}
