//! Error types for the runtime module.

use thiserror::Error;

use crate::id::{AgentId, TopicId};

/// Result type alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that can occur while registering, routing or dispatching messages.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Agent type already registered: {0}")]
    AgentTypeExists(String),

    #[error("Agent type not registered: {0}")]
    UnknownAgentType(String),

    #[error("Subscription already exists: {0}")]
    DuplicateSubscription(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Topic {topic} cannot be handled by subscription {subscription}")]
    CantHandle { topic: TopicId, subscription: String },

    #[error("Handler for {agent} failed: {message}")]
    HandlerFailed { agent: AgentId, message: String },

    #[error("Runtime is not started but has {0} pending message(s)")]
    NotStarted(usize),

    #[error("Runtime has been dropped")]
    Closed,

    #[error("Dispatcher failed: {0}")]
    Dispatcher(String),
}

impl RuntimeError {
    /// Create a handler failure error.
    pub fn handler_failed(agent: &AgentId, message: impl Into<String>) -> Self {
        Self::HandlerFailed {
            agent: agent.clone(),
            message: message.into(),
        }
    }
}
