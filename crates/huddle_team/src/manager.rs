//! The chat manager role.
//!
//! The manager owns the message thread, evaluates the termination condition
//! and decides who speaks next. Which participant that is comes from a
//! [`SpeakerSelector`]; everything else is shared by all turn-taking
//! policies and lives in [`GroupChatManager`].

use std::sync::Arc;

use async_trait::async_trait;
use huddle_runtime::{
    Agent, AgentId, AgentInstantiationContext, MessageContext, MessagePublisher, RuntimeError,
    RuntimeResult, TopicId,
};
use tracing::{debug, info};

use crate::error::{TeamError, TeamResult};
use crate::events::GroupChatEvent;
use crate::termination::TerminationCondition;
use crate::thread::MessageThread;
use crate::types::ChatMessage;

/// Everything a manager needs to know about its team.
#[derive(Clone)]
pub struct ManagerContext {
    pub team_id: String,
    pub group_topic_type: String,
    pub output_topic_type: String,
    /// Participant topics, in participant order
    pub participant_topic_types: Vec<String>,
    pub participant_descriptions: Vec<String>,
    pub message_thread: MessageThread,
    pub termination_condition: Option<Arc<dyn TerminationCondition>>,
}

impl std::fmt::Debug for ManagerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerContext")
            .field("team_id", &self.team_id)
            .field("participants", &self.participant_topic_types)
            .field("termination", &self.termination_condition.is_some())
            .finish()
    }
}

/// Builds the chat manager agent of a team.
pub trait ChatManagerFactory: Send + Sync {
    fn create(
        &self,
        instantiation: AgentInstantiationContext<GroupChatEvent>,
        context: ManagerContext,
    ) -> Box<dyn Agent<GroupChatEvent>>;
}

/// Turn-taking policy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeakerSelector: Send + Sync {
    /// Pick the topic of the next speaker given the full thread.
    async fn select_speaker(&mut self, thread: &[ChatMessage]) -> TeamResult<String>;

    /// Forget per-run state.
    async fn reset(&mut self) -> TeamResult<()>;
}

/// Participants speak in a fixed rotation.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    participants: Vec<String>,
    next: usize,
}

impl RoundRobin {
    pub fn new(participants: Vec<String>) -> Self {
        Self {
            participants,
            next: 0,
        }
    }
}

#[async_trait]
impl SpeakerSelector for RoundRobin {
    async fn select_speaker(&mut self, _thread: &[ChatMessage]) -> TeamResult<String> {
        if self.participants.is_empty() {
            return Err(TeamError::Validation(
                "At least one participant is required.".to_string(),
            ));
        }
        let speaker = self.participants[self.next % self.participants.len()].clone();
        self.next = (self.next + 1) % self.participants.len();
        Ok(speaker)
    }

    async fn reset(&mut self) -> TeamResult<()> {
        self.next = 0;
        Ok(())
    }
}

/// Factory for round-robin managers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobinManagerFactory;

impl ChatManagerFactory for RoundRobinManagerFactory {
    fn create(
        &self,
        instantiation: AgentInstantiationContext<GroupChatEvent>,
        context: ManagerContext,
    ) -> Box<dyn Agent<GroupChatEvent>> {
        let selector = RoundRobin::new(context.participant_topic_types.clone());
        Box::new(GroupChatManager::new(instantiation, context, selector))
    }
}

/// Manager harness parameterized by a turn-taking policy.
///
/// Every participant turn ends in exactly one `Response`, and each response
/// leads to at most one new turn request. Once as many consecutive turns as
/// there are participants produced nothing, nobody is asked again and the
/// run ends when the runtime goes idle.
pub struct GroupChatManager<S: SpeakerSelector> {
    id: AgentId,
    publisher: Arc<dyn MessagePublisher<GroupChatEvent>>,
    context: ManagerContext,
    selector: S,
    silent_turns: usize,
}

impl<S: SpeakerSelector> GroupChatManager<S> {
    pub fn new(
        instantiation: AgentInstantiationContext<GroupChatEvent>,
        context: ManagerContext,
        selector: S,
    ) -> Self {
        Self {
            id: instantiation.id,
            publisher: instantiation.publisher,
            context,
            selector,
            silent_turns: 0,
        }
    }

    fn failed(&self, error: TeamError) -> RuntimeError {
        match error {
            TeamError::Runtime(e) => e,
            other => RuntimeError::handler_failed(&self.id, other.to_string()),
        }
    }

    async fn publish(&self, event: GroupChatEvent, topic_type: &str, ctx: &MessageContext) -> RuntimeResult<()> {
        self.publisher
            .publish_message(
                event,
                TopicId::new(topic_type, &self.context.team_id),
                Some(self.id.clone()),
                ctx.cancellation_token.clone(),
            )
            .await
    }

    /// Append to the thread and evaluate termination. Returns true when the
    /// conversation stopped.
    async fn record(&mut self, delta: Vec<ChatMessage>, ctx: &MessageContext) -> RuntimeResult<bool> {
        self.context.message_thread.append(delta.iter().cloned()).await;

        let Some(condition) = self.context.termination_condition.clone() else {
            return Ok(false);
        };
        let stop = condition.check(&delta).await.map_err(|e| self.failed(e))?;
        let Some(stop) = stop else {
            return Ok(false);
        };

        info!(team_id = %self.context.team_id, reason = %stop.content, "Conversation terminated");
        self.publish(
            GroupChatEvent::Termination { message: stop },
            &self.context.output_topic_type,
            ctx,
        )
        .await?;
        condition.reset().await.map_err(|e| self.failed(e))?;
        Ok(true)
    }

    async fn request_next(&mut self, ctx: &MessageContext) -> RuntimeResult<()> {
        if ctx.cancellation_token.is_cancelled() {
            debug!(team_id = %self.context.team_id, "Cancelled; not requesting another turn");
            return Ok(());
        }

        let thread = self.context.message_thread.snapshot().await;
        let speaker = self
            .selector
            .select_speaker(&thread)
            .await
            .map_err(|e| self.failed(e))?;
        if !self.context.participant_topic_types.contains(&speaker) {
            return Err(self.failed(TeamError::UnknownSpeaker(speaker)));
        }

        debug!(team_id = %self.context.team_id, speaker = %speaker, "Requesting turn");
        self.publish(GroupChatEvent::RequestPublish, &speaker, ctx).await
    }
}

#[async_trait]
impl<S: SpeakerSelector + 'static> Agent<GroupChatEvent> for GroupChatManager<S> {
    fn id(&self) -> &AgentId {
        &self.id
    }

    async fn on_message(&mut self, event: GroupChatEvent, ctx: MessageContext) -> RuntimeResult<()> {
        match event {
            GroupChatEvent::Start { message } => {
                self.silent_turns = 0;
                let output_topic = self.context.output_topic_type.clone();
                self.publish(GroupChatEvent::Start { message: message.clone() }, &output_topic, &ctx)
                    .await?;
                if let Some(message) = message {
                    if self.record(vec![message], &ctx).await? {
                        return Ok(());
                    }
                }
                self.request_next(&ctx).await
            }
            GroupChatEvent::Response { messages } => {
                if messages.is_empty() {
                    self.silent_turns += 1;
                    if self.silent_turns >= self.context.participant_topic_types.len() {
                        info!(team_id = %self.context.team_id, "Nobody has anything left to say");
                        return Ok(());
                    }
                } else {
                    self.silent_turns = 0;
                    if self.record(messages, &ctx).await? {
                        return Ok(());
                    }
                }
                self.request_next(&ctx).await
            }
            GroupChatEvent::Reset => {
                debug!(team_id = %self.context.team_id, "Resetting manager");
                self.silent_turns = 0;
                self.context.message_thread.clear().await;
                if let Some(condition) = &self.context.termination_condition {
                    condition.reset().await.map_err(|e| self.failed(e))?;
                }
                self.selector.reset().await.map_err(|e| self.failed(e))
            }
            GroupChatEvent::Message { .. }
            | GroupChatEvent::Termination { .. }
            | GroupChatEvent::RequestPublish => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::termination::MaxMessageTermination;
    use huddle_runtime::CancellationToken;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(GroupChatEvent, String)>>,
    }

    impl RecordingPublisher {
        fn topics(&self) -> Vec<String> {
            self.published.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl MessagePublisher<GroupChatEvent> for RecordingPublisher {
        async fn publish_message(
            &self,
            message: GroupChatEvent,
            topic_id: TopicId,
            _sender: Option<AgentId>,
            _cancellation_token: CancellationToken,
        ) -> RuntimeResult<()> {
            self.published.lock().unwrap().push((message, topic_id.topic_type));
            Ok(())
        }
    }

    fn context(termination: Option<Arc<dyn TerminationCondition>>) -> ManagerContext {
        ManagerContext {
            team_id: "team".to_string(),
            group_topic_type: "group_topic".to_string(),
            output_topic_type: "output_topic".to_string(),
            participant_topic_types: vec!["alice".to_string(), "bob".to_string()],
            participant_descriptions: vec!["first".to_string(), "second".to_string()],
            message_thread: MessageThread::new(),
            termination_condition: termination,
        }
    }

    fn instantiation(publisher: Arc<RecordingPublisher>) -> AgentInstantiationContext<GroupChatEvent> {
        AgentInstantiationContext {
            id: AgentId::new("group_chat_manager", "team"),
            publisher,
        }
    }

    fn response(contents: &[&str]) -> GroupChatEvent {
        GroupChatEvent::Response {
            messages: contents.iter().map(|c| ChatMessage::text("alice", *c)).collect(),
        }
    }

    fn ctx() -> MessageContext {
        MessageContext {
            sender: None,
            topic_id: TopicId::new("group_topic", "team"),
            cancellation_token: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_round_robin_rotation() {
        let mut selector = RoundRobin::new(vec!["a".into(), "b".into()]);
        assert_eq!(selector.select_speaker(&[]).await.unwrap(), "a");
        assert_eq!(selector.select_speaker(&[]).await.unwrap(), "b");
        assert_eq!(selector.select_speaker(&[]).await.unwrap(), "a");
        selector.reset().await.unwrap();
        assert_eq!(selector.select_speaker(&[]).await.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_start_echoes_task_and_requests_selected_speaker() {
        let publisher = Arc::new(RecordingPublisher::default());
        let context = context(None);
        let thread = context.message_thread.clone();

        let mut selector = MockSpeakerSelector::new();
        selector
            .expect_select_speaker()
            .withf(|thread| thread.len() == 1 && thread[0].content == "Hello")
            .times(1)
            .returning(|_| Ok("bob".to_string()));

        let mut manager = GroupChatManager::new(instantiation(Arc::clone(&publisher)), context, selector);
        manager
            .on_message(GroupChatEvent::Start { message: Some(ChatMessage::task("Hello")) }, ctx())
            .await
            .unwrap();

        assert_eq!(publisher.topics(), vec!["output_topic", "bob"]);
        assert_eq!(thread.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_speaker_is_an_error() {
        let publisher = Arc::new(RecordingPublisher::default());
        let mut selector = MockSpeakerSelector::new();
        selector
            .expect_select_speaker()
            .returning(|_| Ok("mallory".to_string()));

        let mut manager = GroupChatManager::new(instantiation(Arc::clone(&publisher)), context(None), selector);
        let err = manager
            .on_message(response(&["hi"]), ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("mallory"));
        assert!(publisher.topics().is_empty());
    }

    #[tokio::test]
    async fn test_termination_publishes_stop_and_resets_condition() {
        let publisher = Arc::new(RecordingPublisher::default());
        let condition = Arc::new(MaxMessageTermination::new(2));
        let mut selector = MockSpeakerSelector::new();
        selector.expect_select_speaker().times(1).returning(|_| Ok("alice".to_string()));

        let mut manager = GroupChatManager::new(
            instantiation(Arc::clone(&publisher)),
            context(Some(condition.clone() as Arc<dyn TerminationCondition>)),
            selector,
        );
        manager
            .on_message(GroupChatEvent::Start { message: Some(ChatMessage::task("Hello")) }, ctx())
            .await
            .unwrap();
        manager
            .on_message(response(&["hi"]), ctx())
            .await
            .unwrap();

        assert_eq!(publisher.topics(), vec!["output_topic", "alice", "output_topic"]);
        let last = publisher.published.lock().unwrap().last().cloned().unwrap();
        assert!(matches!(last.0, GroupChatEvent::Termination { ref message } if message.is_stop()));
        assert!(!condition.terminated());
    }

    #[tokio::test]
    async fn test_cancelled_manager_stops_requesting_turns() {
        let publisher = Arc::new(RecordingPublisher::default());
        let mut selector = MockSpeakerSelector::new();
        selector.expect_select_speaker().never();

        let mut manager = GroupChatManager::new(instantiation(Arc::clone(&publisher)), context(None), selector);
        let ctx = ctx();
        ctx.cancellation_token.cancel();
        manager
            .on_message(response(&["hi"]), ctx)
            .await
            .unwrap();
        assert!(publisher.topics().is_empty());
    }

    #[tokio::test]
    async fn test_multi_message_turn_requests_one_speaker() {
        let publisher = Arc::new(RecordingPublisher::default());
        let context = context(None);
        let thread = context.message_thread.clone();

        let mut selector = MockSpeakerSelector::new();
        selector
            .expect_select_speaker()
            .withf(|thread| thread.len() == 2)
            .times(1)
            .returning(|_| Ok("bob".to_string()));

        let mut manager = GroupChatManager::new(instantiation(Arc::clone(&publisher)), context, selector);
        manager.on_message(response(&["one", "two"]), ctx()).await.unwrap();

        assert_eq!(publisher.topics(), vec!["bob"]);
        assert_eq!(thread.len().await, 2);
    }

    #[tokio::test]
    async fn test_silent_turns_end_after_a_full_round() {
        let publisher = Arc::new(RecordingPublisher::default());
        let mut selector = MockSpeakerSelector::new();
        selector.expect_select_speaker().times(3).returning(|_| Ok("bob".to_string()));

        let mut manager = GroupChatManager::new(instantiation(Arc::clone(&publisher)), context(None), selector);
        // A silent turn passes the floor on.
        manager.on_message(response(&[]), ctx()).await.unwrap();
        // Speaking again resets the silence count.
        manager.on_message(response(&["hi"]), ctx()).await.unwrap();
        // Two participants, two silent turns in a row: nobody is asked again.
        manager.on_message(response(&[]), ctx()).await.unwrap();
        manager.on_message(response(&[]), ctx()).await.unwrap();

        assert_eq!(publisher.topics(), vec!["bob", "bob", "bob"]);
    }

    #[tokio::test]
    async fn test_reset_clears_thread_and_selector() {
        let publisher = Arc::new(RecordingPublisher::default());
        let context = context(None);
        let thread = context.message_thread.clone();
        thread.append(vec![ChatMessage::task("old")]).await;

        let mut selector = MockSpeakerSelector::new();
        selector.expect_reset().times(1).returning(|| Ok(()));

        let mut manager = GroupChatManager::new(instantiation(publisher), context, selector);
        manager.on_message(GroupChatEvent::Reset, ctx()).await.unwrap();
        assert!(thread.is_empty().await);
    }
}
