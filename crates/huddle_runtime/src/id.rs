//! Agent and topic identifiers.

use std::fmt;

/// Identity of one agent instance: its registered type plus a key.
///
/// Instances are created lazily, one per distinct key, the first time a
/// subscription routes a message to them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId {
    pub agent_type: String,
    pub key: String,
}

impl AgentId {
    pub fn new(agent_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agent_type, self.key)
    }
}

/// A routing channel. `topic_type` selects subscribers, `source` scopes the
/// topic to one publisher (for teams, the team id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicId {
    pub topic_type: String,
    pub source: String,
}

impl TopicId {
    pub fn new(topic_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            topic_type: topic_type.into(),
            source: source.into(),
        }
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic_type, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(AgentId::new("writer", "team-1").to_string(), "writer/team-1");
        assert_eq!(TopicId::new("group_topic", "team-1").to_string(), "group_topic/team-1");
    }

    #[test]
    fn test_agent_id_equality() {
        assert_eq!(AgentId::new("a", "k"), AgentId::new("a", "k"));
        assert_ne!(AgentId::new("a", "k"), AgentId::new("a", "other"));
    }
}
