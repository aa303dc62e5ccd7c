//! # huddle_runtime
//!
//! In-process publish/subscribe runtime that hosts huddle agents.
//!
//! # Architecture
//!
//! - **Agents**: Message handlers registered by type and instantiated lazily
//! - **Subscriptions**: Route topic types to agent types
//! - **Registry**: Maps agent types to factories and holds subscriptions
//! - **Runtime**: Queues published messages and dispatches them in order
//!
//! # Example
//!
//! ```rust,ignore
//! use huddle_runtime::{AgentRuntime, SingleThreadedRuntime, Subscription, TopicId};
//!
//! let runtime = SingleThreadedRuntime::<String>::new();
//! runtime.register("printer", printer_factory()).await?;
//! runtime.add_subscription(Subscription::by_type("news", "printer")).await?;
//!
//! runtime.start();
//! runtime.publish("hello".to_string(), TopicId::new("news", "default")).await?;
//! runtime.stop_when_idle().await?;
//! ```

pub mod agent;
pub mod error;
pub mod id;
pub mod registry;
pub mod runtime;
pub mod subscription;

pub use agent::{
    Agent, AgentFactory, AgentInstantiationContext, Message, MessageContext, MessagePublisher,
};
pub use error::{RuntimeError, RuntimeResult};
pub use id::{AgentId, TopicId};
pub use registry::AgentRegistry;
pub use runtime::{AgentRuntime, SingleThreadedRuntime};
pub use subscription::{Subscription, TopicMatcher};

// Re-exported so callers do not need a direct tokio-util dependency.
pub use tokio_util::sync::CancellationToken;
