//! # huddle_team
//!
//! Multi-participant conversations coordinated over the huddle runtime.
//!
//! A [`GroupChat`] hosts a set of [`ChatAgent`] participants. A chat manager
//! decides who speaks next and when the conversation ends; every message
//! that reaches the team's output topic is streamed to the caller in order,
//! followed by a final [`TaskResult`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐   Start    ┌─────────────────┐  RequestPublish  ┌─────────────────┐
//! │    GroupChat    │──────────▶│   Chat manager  │─────────────────▶│   Participant   │
//! └────────▲────────┘           └────────▲────────┘                  └────────┬────────┘
//!          │ run stream                  │ Response (group topic)             │
//!          │                             └────────────────────────────────────┤
//! ┌────────┴────────┐  Message / Termination (output topic)                   │
//! │ Output collector│◀────────────────────────────────────────────────────────┘
//! └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use huddle_team::{EchoAgent, GroupChat, MaxMessageTermination};
//!
//! let team = GroupChat::round_robin(
//!     vec![Arc::new(EchoAgent::new("alice")), Arc::new(EchoAgent::new("bob"))],
//!     Some(Arc::new(MaxMessageTermination::new(4))),
//! )?;
//! let result = team.run(Some("Hello".to_string()), None).await?;
//! assert_eq!(result.messages.len(), 4);
//! ```

pub mod agents;
pub mod collector;
pub mod component;
pub mod config;
pub mod container;
pub mod error;
pub mod events;
pub mod manager;
pub mod team;
pub mod termination;
pub mod thread;
pub mod types;

pub use agents::{ChatAgent, EchoAgent, ScriptedAgent};
pub use collector::{OutputCollector, OutputSink, StopReason};
pub use component::{load_termination, ComponentModel, COMPONENT_SCHEMA_VERSION, TERMINATION_COMPONENT_TYPE};
pub use config::{ParticipantConfig, TeamConfig, ValidationResult};
pub use container::ChatAgentContainer;
pub use error::{TeamError, TeamResult};
pub use events::GroupChatEvent;
pub use manager::{
    ChatManagerFactory, GroupChatManager, ManagerContext, RoundRobin, RoundRobinManagerFactory,
    SpeakerSelector,
};
pub use team::{
    GroupChat, TeamTopics, COLLECTOR_AGENT_TYPE, GROUP_TOPIC_TYPE, MANAGER_TOPIC_TYPE,
    OUTPUT_TOPIC_TYPE,
};
pub use termination::{
    MaxMessageTermination, OrTermination, TerminationCondition, TextMentionTermination,
};
pub use thread::MessageThread;
pub use types::{ChatMessage, MessageKind, TaskEvent, TaskResult, USER_SOURCE};

pub use huddle_runtime::CancellationToken;
