//! Termination conditions.
//!
//! A termination condition is fed every message the chat manager appends to
//! the thread. When it fires it produces a stop message whose content becomes
//! the run's stop reason. A fired condition must be reset before it can be
//! checked again; the manager does this right after publishing the stop.
//!
//! Conditions compose with `|`:
//!
//! ```rust,ignore
//! let condition = MaxMessageTermination::new(10) | TextMentionTermination::new("TERMINATE");
//! ```

use std::ops::BitOr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::component::{ComponentModel, TERMINATION_COMPONENT_TYPE};
use crate::error::{TeamError, TeamResult};
use crate::types::ChatMessage;

/// Decides when a conversation should stop.
#[async_trait]
pub trait TerminationCondition: Send + Sync {
    /// Whether the condition has fired and not been reset since.
    fn terminated(&self) -> bool;

    /// Inspect the messages appended since the previous check. Returns the
    /// stop message when the condition fires.
    async fn check(&self, messages: &[ChatMessage]) -> TeamResult<Option<ChatMessage>>;

    /// Return to the initial state.
    async fn reset(&self) -> TeamResult<()>;

    /// Serialize the condition's configuration.
    fn dump_component(&self) -> TeamResult<ComponentModel>;
}

/// Stops once a number of messages has been seen.
#[derive(Debug)]
pub struct MaxMessageTermination {
    max_messages: usize,
    count: AtomicUsize,
    terminated: AtomicBool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxMessageTerminationConfig {
    pub max_messages: usize,
}

impl MaxMessageTermination {
    pub const PROVIDER: &'static str = "max_message";

    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages,
            count: AtomicUsize::new(0),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn from_config(config: MaxMessageTerminationConfig) -> TeamResult<Self> {
        if config.max_messages == 0 {
            return Err(TeamError::component("max_messages must be greater than zero"));
        }
        Ok(Self::new(config.max_messages))
    }
}

#[async_trait]
impl TerminationCondition for MaxMessageTermination {
    fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    async fn check(&self, messages: &[ChatMessage]) -> TeamResult<Option<ChatMessage>> {
        if self.terminated() {
            return Err(TeamError::AlreadyTerminated);
        }
        let count = self.count.fetch_add(messages.len(), Ordering::SeqCst) + messages.len();
        if count < self.max_messages {
            return Ok(None);
        }

        debug!(count, max = self.max_messages, "Message limit reached");
        self.terminated.store(true, Ordering::SeqCst);
        Ok(Some(ChatMessage::stop(
            "MaxMessageTermination",
            format!(
                "Maximum number of messages {} reached, current message count: {}",
                self.max_messages, count
            ),
        )))
    }

    async fn reset(&self) -> TeamResult<()> {
        self.count.store(0, Ordering::SeqCst);
        self.terminated.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn dump_component(&self) -> TeamResult<ComponentModel> {
        let config = MaxMessageTerminationConfig {
            max_messages: self.max_messages,
        };
        Ok(ComponentModel::new(Self::PROVIDER, serde_json::to_value(config)?)
            .with_component_type(TERMINATION_COMPONENT_TYPE)
            .with_description("Terminate the conversation after a maximum number of messages."))
    }
}

/// Stops when a message mentions a given text.
#[derive(Debug)]
pub struct TextMentionTermination {
    text: String,
    terminated: AtomicBool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextMentionTerminationConfig {
    pub text: String,
}

impl TextMentionTermination {
    pub const PROVIDER: &'static str = "text_mention";

    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn from_config(config: TextMentionTerminationConfig) -> TeamResult<Self> {
        if config.text.is_empty() {
            return Err(TeamError::component("text must not be empty"));
        }
        Ok(Self::new(config.text))
    }
}

#[async_trait]
impl TerminationCondition for TextMentionTermination {
    fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    async fn check(&self, messages: &[ChatMessage]) -> TeamResult<Option<ChatMessage>> {
        if self.terminated() {
            return Err(TeamError::AlreadyTerminated);
        }
        let Some(mention) = messages.iter().find(|m| m.content.contains(&self.text)) else {
            return Ok(None);
        };

        debug!(source = %mention.source, text = %self.text, "Termination text mentioned");
        self.terminated.store(true, Ordering::SeqCst);
        Ok(Some(ChatMessage::stop(
            "TextMentionTermination",
            format!("Text '{}' mentioned", self.text),
        )))
    }

    async fn reset(&self) -> TeamResult<()> {
        self.terminated.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn dump_component(&self) -> TeamResult<ComponentModel> {
        let config = TextMentionTerminationConfig {
            text: self.text.clone(),
        };
        Ok(ComponentModel::new(Self::PROVIDER, serde_json::to_value(config)?)
            .with_component_type(TERMINATION_COMPONENT_TYPE)
            .with_description("Terminate the conversation if a specific text is mentioned."))
    }
}

/// Stops when any of its conditions stops.
pub struct OrTermination {
    conditions: Vec<Arc<dyn TerminationCondition>>,
    terminated: AtomicBool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrTerminationConfig {
    pub conditions: Vec<ComponentModel>,
}

impl OrTermination {
    pub const PROVIDER: &'static str = "or";

    pub fn new(conditions: Vec<Arc<dyn TerminationCondition>>) -> Self {
        Self {
            conditions,
            terminated: AtomicBool::new(false),
        }
    }

    pub fn conditions(&self) -> &[Arc<dyn TerminationCondition>] {
        &self.conditions
    }
}

#[async_trait]
impl TerminationCondition for OrTermination {
    fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    async fn check(&self, messages: &[ChatMessage]) -> TeamResult<Option<ChatMessage>> {
        if self.terminated() {
            return Err(TeamError::AlreadyTerminated);
        }

        // Every condition sees every message, even after one has fired.
        let mut stops = Vec::new();
        for condition in &self.conditions {
            if let Some(stop) = condition.check(messages).await? {
                stops.push(stop);
            }
        }
        if stops.is_empty() {
            return Ok(None);
        }

        self.terminated.store(true, Ordering::SeqCst);
        let source = stops.iter().map(|s| s.source.as_str()).collect::<Vec<_>>().join(", ");
        let content = stops.iter().map(|s| s.content.as_str()).collect::<Vec<_>>().join("; ");
        Ok(Some(ChatMessage::stop(source, content)))
    }

    async fn reset(&self) -> TeamResult<()> {
        for condition in &self.conditions {
            condition.reset().await?;
        }
        self.terminated.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn dump_component(&self) -> TeamResult<ComponentModel> {
        let config = OrTerminationConfig {
            conditions: self
                .conditions
                .iter()
                .map(|c| c.dump_component())
                .collect::<TeamResult<Vec<_>>>()?,
        };
        Ok(ComponentModel::new(Self::PROVIDER, serde_json::to_value(config)?)
            .with_component_type(TERMINATION_COMPONENT_TYPE)
            .with_description("Terminate the conversation if any of the conditions is met."))
    }
}

impl std::fmt::Debug for OrTermination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrTermination")
            .field("conditions", &self.conditions.len())
            .field("terminated", &self.terminated())
            .finish()
    }
}

macro_rules! impl_bitor {
    ($($condition:ty),*) => {
        $(
            impl<R: TerminationCondition + 'static> BitOr<R> for $condition {
                type Output = OrTermination;

                fn bitor(self, rhs: R) -> OrTermination {
                    OrTermination::new(vec![Arc::new(self), Arc::new(rhs)])
                }
            }
        )*
    };
}

impl_bitor!(MaxMessageTermination, TextMentionTermination, OrTermination);
