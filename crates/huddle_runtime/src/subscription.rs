//! Topic subscriptions.
//!
//! A subscription decides whether a published topic is of interest to an
//! agent type and, if so, which agent instance receives it. Both kinds map
//! the topic `source` to the agent key, so every source gets its own
//! instance of the agent type.
//!
//! | Kind | Matches | Example |
//! |------|---------|---------|
//! | [`Subscription::by_type`] | `topic_type == t` | `group_topic` |
//! | [`Subscription::by_prefix`] | `topic_type.starts_with(p)` | `worker.` matches `worker.build` |

use uuid::Uuid;

use crate::error::{RuntimeError, RuntimeResult};
use crate::id::{AgentId, TopicId};

/// How a subscription matches topic types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicMatcher {
    /// Exact topic type
    Type(String),
    /// Topic type prefix
    Prefix(String),
}

impl TopicMatcher {
    fn matches(&self, topic_type: &str) -> bool {
        match self {
            Self::Type(t) => topic_type == t,
            Self::Prefix(p) => topic_type.starts_with(p.as_str()),
        }
    }
}

/// Routes topics to an agent type.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: String,
    matcher: TopicMatcher,
    agent_type: String,
}

impl Subscription {
    /// Subscribe `agent_type` to every topic whose type is exactly `topic_type`.
    pub fn by_type(topic_type: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            matcher: TopicMatcher::Type(topic_type.into()),
            agent_type: agent_type.into(),
        }
    }

    /// Subscribe `agent_type` to every topic whose type starts with `prefix`.
    pub fn by_prefix(prefix: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            matcher: TopicMatcher::Prefix(prefix.into()),
            agent_type: agent_type.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn matcher(&self) -> &TopicMatcher {
        &self.matcher
    }

    pub fn is_match(&self, topic_id: &TopicId) -> bool {
        self.matcher.matches(&topic_id.topic_type)
    }

    /// Map a matching topic to the agent instance that should receive it.
    pub fn map_to_agent(&self, topic_id: &TopicId) -> RuntimeResult<AgentId> {
        if !self.is_match(topic_id) {
            return Err(RuntimeError::CantHandle {
                topic: topic_id.clone(),
                subscription: self.id.clone(),
            });
        }
        Ok(AgentId::new(&self.agent_type, &topic_id.source))
    }
}

/// Two subscriptions are equal when they share an id or route the same
/// topics to the same agent type.
impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            || (self.agent_type == other.agent_type && self.matcher == other.matcher)
    }
}

impl Eq for Subscription {}
