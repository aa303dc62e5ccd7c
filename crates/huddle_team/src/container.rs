//! Adapter that hosts a [`ChatAgent`] on the runtime.

use std::sync::Arc;

use async_trait::async_trait;
use huddle_runtime::{
    Agent, AgentId, AgentInstantiationContext, MessageContext, MessagePublisher, RuntimeError,
    RuntimeResult, TopicId,
};
use tracing::{debug, info};

use crate::agents::ChatAgent;
use crate::events::GroupChatEvent;
use crate::types::ChatMessage;

/// Runtime agent wrapping one participant.
///
/// Buffers every chat message seen on the group topic and hands the buffer
/// to the participant when the manager requests a turn. Each reply is
/// published to the output topic, then the whole turn goes to the group
/// topic as a single `Response`.
pub struct ChatAgentContainer {
    id: AgentId,
    publisher: Arc<dyn MessagePublisher<GroupChatEvent>>,
    group_topic_type: String,
    output_topic_type: String,
    agent: Arc<dyn ChatAgent>,
    buffer: Vec<ChatMessage>,
}

impl ChatAgentContainer {
    pub fn new(
        ctx: AgentInstantiationContext<GroupChatEvent>,
        group_topic_type: impl Into<String>,
        output_topic_type: impl Into<String>,
        agent: Arc<dyn ChatAgent>,
    ) -> Self {
        Self {
            id: ctx.id,
            publisher: ctx.publisher,
            group_topic_type: group_topic_type.into(),
            output_topic_type: output_topic_type.into(),
            agent,
            buffer: Vec::new(),
        }
    }

    /// Messages received since the last turn.
    pub fn buffered(&self) -> &[ChatMessage] {
        &self.buffer
    }

    async fn take_turn(&mut self, ctx: &MessageContext) -> RuntimeResult<()> {
        let history = std::mem::take(&mut self.buffer);
        debug!(agent = %self.agent.name(), history = history.len(), "Taking turn");

        let replies = self
            .agent
            .on_messages(&history, &ctx.cancellation_token)
            .await
            .map_err(|e| RuntimeError::handler_failed(&self.id, e.to_string()))?;
        if replies.is_empty() {
            info!(agent = %self.agent.name(), "Participant had nothing to say");
        }

        let team = &self.id.key;
        for reply in &replies {
            self.publisher
                .publish_message(
                    GroupChatEvent::Message { message: reply.clone() },
                    TopicId::new(&self.output_topic_type, team),
                    Some(self.id.clone()),
                    ctx.cancellation_token.clone(),
                )
                .await?;
        }
        self.publisher
            .publish_message(
                GroupChatEvent::Response { messages: replies },
                TopicId::new(&self.group_topic_type, team),
                Some(self.id.clone()),
                ctx.cancellation_token.clone(),
            )
            .await
    }
}

#[async_trait]
impl Agent<GroupChatEvent> for ChatAgentContainer {
    fn id(&self) -> &AgentId {
        &self.id
    }

    async fn on_message(&mut self, event: GroupChatEvent, ctx: MessageContext) -> RuntimeResult<()> {
        match event {
            GroupChatEvent::Start { message } => {
                self.buffer.extend(message);
                Ok(())
            }
            GroupChatEvent::Message { message } => {
                self.buffer.push(message);
                Ok(())
            }
            GroupChatEvent::Response { messages } => {
                self.buffer.extend(messages);
                Ok(())
            }
            GroupChatEvent::RequestPublish => self.take_turn(&ctx).await,
            GroupChatEvent::Reset => {
                self.buffer.clear();
                self.agent
                    .reset(&ctx.cancellation_token)
                    .await
                    .map_err(|e| RuntimeError::handler_failed(&self.id, e.to_string()))
            }
            GroupChatEvent::Termination { .. } => Ok(()),
        }
    }
}
