//! Core types for group chat teams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source name used for the task message a caller hands to a run.
pub const USER_SOURCE: &str = "user";

/// Kind of chat message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ordinary conversational text
    Text,
    /// A request to stop the conversation
    Stop,
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Message kind
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Name of the producer (participant name or `user`)
    pub source: String,
    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a text message
    pub fn text(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            source: source.into(),
            content: content.into(),
        }
    }

    /// Create a stop message
    pub fn stop(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Stop,
            source: source.into(),
            content: content.into(),
        }
    }

    /// Create the task message for a run
    pub fn task(content: impl Into<String>) -> Self {
        Self::text(USER_SOURCE, content)
    }

    pub fn is_stop(&self) -> bool {
        self.kind == MessageKind::Stop
    }
}

impl std::fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.source, self.content)
    }
}

/// Summary of one run: every message seen on the output topic, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Messages in output-topic delivery order
    pub messages: Vec<ChatMessage>,
    /// Set iff a termination was observed during the run
    #[serde(rename = "stopReason", skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// When the run started
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    /// When the run completed
    #[serde(rename = "completedAt")]
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    /// Contents of all messages, in order.
    pub fn contents(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.content.as_str()).collect()
    }
}

/// One item of a run stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A chat message, yielded as soon as it reaches the output topic
    Message(ChatMessage),
    /// The terminal summary, always the last item of a successful run
    Result(TaskResult),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let task = ChatMessage::task("Hello");
        assert_eq!(task.source, USER_SOURCE);
        assert_eq!(task.kind, MessageKind::Text);
        assert!(!task.is_stop());

        let stop = ChatMessage::stop("MaxMessageTermination", "done");
        assert!(stop.is_stop());
        assert_eq!(stop.to_string(), "[MaxMessageTermination] done");
    }

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_value(ChatMessage::text("alice", "hi")).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["source"], "alice");
    }

    #[test]
    fn test_task_event_serialization() {
        let event = TaskEvent::Message(ChatMessage::text("bob", "yo"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "message");
        assert_eq!(json["content"], "yo");

        let result = TaskEvent::Result(TaskResult {
            messages: vec![],
            stop_reason: None,
            started_at: Utc::now(),
            completed_at: Utc::now(),
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["event"], "result");
        assert!(json.get("stopReason").is_none());
    }
}
