//! Agent trait and handler context.
//!
//! Agents are message handlers registered with a runtime by type. The runtime
//! owns the instances; it builds them on first delivery through the factory
//! registered for their type.
//!
//! # Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use huddle_runtime::{Agent, AgentId, MessageContext, RuntimeResult};
//!
//! struct Logger { id: AgentId }
//!
//! #[async_trait]
//! impl Agent<String> for Logger {
//!     fn id(&self) -> &AgentId { &self.id }
//!
//!     async fn on_message(&mut self, message: String, _ctx: MessageContext) -> RuntimeResult<()> {
//!         tracing::info!("{}", message);
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::RuntimeResult;
use crate::id::{AgentId, TopicId};

/// Payload types a runtime can carry. Delivered by clone to every
/// recipient of a topic.
pub trait Message: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Message for T {}

/// Delivery metadata handed to a handler alongside the message.
#[derive(Debug, Clone)]
pub struct MessageContext {
    /// Agent that published the message, `None` for external publishers
    pub sender: Option<AgentId>,
    /// Topic the message was published on
    pub topic_id: TopicId,
    /// Cancellation signal of the publish that caused this delivery
    pub cancellation_token: CancellationToken,
}

/// A message handler living inside a runtime.
#[async_trait]
pub trait Agent<M: Message>: Send {
    /// Identity this instance was created with.
    fn id(&self) -> &AgentId;

    /// Handle one delivered message.
    async fn on_message(&mut self, message: M, ctx: MessageContext) -> RuntimeResult<()>;
}

/// Publishing capability handed to agents so they can emit messages.
#[async_trait]
pub trait MessagePublisher<M: Message>: Send + Sync {
    async fn publish_message(
        &self,
        message: M,
        topic_id: TopicId,
        sender: Option<AgentId>,
        cancellation_token: CancellationToken,
    ) -> RuntimeResult<()>;
}

/// Passed to a factory when the runtime instantiates an agent.
pub struct AgentInstantiationContext<M: Message> {
    /// Identity the runtime assigned to the new instance
    pub id: AgentId,
    /// Handle for publishing back into the runtime
    pub publisher: Arc<dyn MessagePublisher<M>>,
}

impl<M: Message> Clone for AgentInstantiationContext<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            publisher: Arc::clone(&self.publisher),
        }
    }
}

impl<M: Message> std::fmt::Debug for AgentInstantiationContext<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentInstantiationContext")
            .field("id", &self.id)
            .finish()
    }
}

/// Builds an agent instance for a registered type.
pub type AgentFactory<M> =
    Arc<dyn Fn(AgentInstantiationContext<M>) -> Box<dyn Agent<M>> + Send + Sync>;
