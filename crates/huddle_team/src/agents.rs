//! Participants of a team.
//!
//! A participant is anything implementing [`ChatAgent`]: it is handed the
//! messages it has not seen yet when its turn comes, and answers with zero
//! or more messages of its own. Returning nothing passes the floor on; once
//! a full round of turns produced nothing the conversation goes idle and
//! the run completes.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use huddle_runtime::CancellationToken;

use crate::error::TeamResult;
use crate::types::ChatMessage;

/// A conversational participant.
#[async_trait]
pub trait ChatAgent: Send + Sync {
    /// Unique name within the team. Also used as the participant's topic.
    fn name(&self) -> &str;

    /// What this participant does. Handed to the chat manager.
    fn description(&self) -> &str;

    /// Take a turn given the messages received since the previous turn.
    async fn on_messages(
        &self,
        messages: &[ChatMessage],
        cancellation_token: &CancellationToken,
    ) -> TeamResult<Vec<ChatMessage>>;

    /// Forget all per-run state.
    async fn reset(&self, _cancellation_token: &CancellationToken) -> TeamResult<()> {
        Ok(())
    }
}

/// Repeats the last message it was given.
pub struct EchoAgent {
    name: String,
    description: String,
}

impl EchoAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "An agent that echoes the last message it received.".to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl ChatAgent for EchoAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn on_messages(
        &self,
        messages: &[ChatMessage],
        _cancellation_token: &CancellationToken,
    ) -> TeamResult<Vec<ChatMessage>> {
        Ok(messages
            .last()
            .map(|last| ChatMessage::text(&self.name, &last.content))
            .into_iter()
            .collect())
    }
}

/// Replies with a fixed list of lines, one per turn, then stays silent.
pub struct ScriptedAgent {
    name: String,
    description: String,
    replies: Vec<String>,
    next: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new<I, S>(name: impl Into<String>, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: "An agent that replies from a script.".to_string(),
            replies: replies.into_iter().map(Into::into).collect(),
            next: AtomicUsize::new(0),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Number of scripted lines not yet spoken.
    pub fn remaining(&self) -> usize {
        self.replies
            .len()
            .saturating_sub(self.next.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl ChatAgent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn on_messages(
        &self,
        _messages: &[ChatMessage],
        _cancellation_token: &CancellationToken,
    ) -> TeamResult<Vec<ChatMessage>> {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .replies
            .get(index)
            .map(|reply| ChatMessage::text(&self.name, reply))
            .into_iter()
            .collect())
    }

    async fn reset(&self, _cancellation_token: &CancellationToken) -> TeamResult<()> {
        self.next.store(0, Ordering::SeqCst);
        Ok(())
    }
}
