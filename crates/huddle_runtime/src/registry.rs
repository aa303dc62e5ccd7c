//! Agent registry for managing factories and subscriptions.

use std::collections::HashMap;

use tracing::debug;

use crate::agent::{AgentFactory, Message};
use crate::error::{RuntimeError, RuntimeResult};
use crate::id::{AgentId, TopicId};
use crate::subscription::Subscription;

/// A registry of agent factories and the subscriptions that route topics to
/// them.
///
/// Each agent type can be registered once. Subscriptions may reference types
/// that are registered later; routing to an unregistered type fails at
/// delivery time.
pub struct AgentRegistry<M: Message> {
    factories: HashMap<String, AgentFactory<M>>,
    subscriptions: Vec<Subscription>,
}

impl<M: Message> Default for AgentRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Message> AgentRegistry<M> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            subscriptions: Vec::new(),
        }
    }

    /// Register a factory for an agent type.
    pub fn register(&mut self, agent_type: impl Into<String>, factory: AgentFactory<M>) -> RuntimeResult<()> {
        let agent_type = agent_type.into();
        if self.factories.contains_key(&agent_type) {
            return Err(RuntimeError::AgentTypeExists(agent_type));
        }
        debug!("Registering agent type: {}", agent_type);
        self.factories.insert(agent_type, factory);
        Ok(())
    }

    /// Get the factory for an agent type.
    pub fn factory(&self, agent_type: &str) -> Option<AgentFactory<M>> {
        self.factories.get(agent_type).cloned()
    }

    /// Get the factory for an agent type, returning an error if not found.
    pub fn factory_required(&self, agent_type: &str) -> RuntimeResult<AgentFactory<M>> {
        self.factory(agent_type)
            .ok_or_else(|| RuntimeError::UnknownAgentType(agent_type.to_string()))
    }

    /// Check if an agent type is registered.
    pub fn contains(&self, agent_type: &str) -> bool {
        self.factories.contains_key(agent_type)
    }

    /// Get all registered agent types, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Add a subscription.
    pub fn add_subscription(&mut self, subscription: Subscription) -> RuntimeResult<()> {
        if self.subscriptions.contains(&subscription) {
            return Err(RuntimeError::DuplicateSubscription(subscription.id().to_string()));
        }
        debug!(
            subscription = subscription.id(),
            agent_type = subscription.agent_type(),
            matcher = ?subscription.matcher(),
            "Adding subscription"
        );
        self.subscriptions.push(subscription);
        Ok(())
    }

    /// Remove a subscription by id.
    pub fn remove_subscription(&mut self, id: &str) -> RuntimeResult<Subscription> {
        let index = self
            .subscriptions
            .iter()
            .position(|s| s.id() == id)
            .ok_or_else(|| RuntimeError::SubscriptionNotFound(id.to_string()))?;
        debug!("Removing subscription: {}", id);
        Ok(self.subscriptions.remove(index))
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    /// Resolve the agent instances that receive a topic, in subscription
    /// order and without duplicates.
    pub fn recipients(&self, topic_id: &TopicId) -> Vec<AgentId> {
        let mut recipients: Vec<AgentId> = Vec::new();
        for subscription in self.subscriptions.iter().filter(|s| s.is_match(topic_id)) {
            if let Ok(agent_id) = subscription.map_to_agent(topic_id) {
                if !recipients.contains(&agent_id) {
                    recipients.push(agent_id);
                }
            }
        }
        recipients
    }

    /// Get the number of registered agent types.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<M: Message> std::fmt::Debug for AgentRegistry<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("types", &self.types())
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}
