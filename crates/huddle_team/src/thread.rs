//! The shared message thread of a team.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::types::ChatMessage;

/// Append-only ordered conversation history.
///
/// Cloning yields a handle to the same thread. Only the chat manager writes
/// to it; everything else reads snapshots.
#[derive(Debug, Clone, Default)]
pub struct MessageThread {
    messages: Arc<RwLock<Vec<ChatMessage>>>,
}

impl MessageThread {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append messages to the end of the thread.
    pub async fn append(&self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.write().await.extend(messages);
    }

    /// Copy of the current history.
    pub async fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    /// Drop all history. Used on reset.
    pub async fn clear(&self) {
        self.messages.write().await.clear();
    }
}
