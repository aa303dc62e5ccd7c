//! The team coordinator.
//!
//! [`GroupChat`] wires participants, a chat manager and an output collector
//! onto a private runtime and drives runs over them:
//!
//! ```text
//!               Start / Reset
//!   GroupChat ──────────────▶ group_topic ──────────▶ manager, participants
//!                                 ▲                        │
//!                                 │ Response      RequestPublish
//!                                 │                        ▼
//!                           participant ◀─────────── <participant topic>
//!                                 │
//!                                 │ Message     Start / Termination (manager)
//!                                 ▼
//!                            output_topic ─────────▶ collector ──▶ run stream
//! ```
//!
//! A run ends when the runtime goes idle: every handler has returned and no
//! published message is waiting. The shutdown watcher then closes the run's
//! output channel, so the stream sees everything published before the end.
//! The watcher also owns the team's running flag: a stream dropped mid-run
//! cancels its conversation, and the next run is only accepted once that
//! conversation has gone idle.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use huddle_runtime::{
    Agent, AgentFactory, AgentId, AgentInstantiationContext, AgentRuntime, CancellationToken,
    MessagePublisher, RuntimeError, RuntimeResult, SingleThreadedRuntime, Subscription, TopicId,
};
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::DropGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agents::ChatAgent;
use crate::collector::{OutputCollector, OutputSink, StopReason};
use crate::container::ChatAgentContainer;
use crate::error::{TeamError, TeamResult};
use crate::events::GroupChatEvent;
use crate::manager::{ChatManagerFactory, ManagerContext, RoundRobinManagerFactory};
use crate::termination::TerminationCondition;
use crate::thread::MessageThread;
use crate::types::{ChatMessage, TaskEvent, TaskResult};

pub const GROUP_TOPIC_TYPE: &str = "group_topic";
pub const OUTPUT_TOPIC_TYPE: &str = "output_topic";
pub const MANAGER_TOPIC_TYPE: &str = "group_chat_manager";
pub const COLLECTOR_AGENT_TYPE: &str = "collect_output_messages";

/// Topic and agent type names used by a team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamTopics {
    pub group: String,
    pub output: String,
    pub manager: String,
    pub collector: String,
    /// One topic per participant, named after it
    pub participants: Vec<String>,
}

impl TeamTopics {
    fn new(participants: Vec<String>) -> Self {
        Self {
            group: GROUP_TOPIC_TYPE.to_string(),
            output: OUTPUT_TOPIC_TYPE.to_string(),
            manager: MANAGER_TOPIC_TYPE.to_string(),
            collector: COLLECTOR_AGENT_TYPE.to_string(),
            participants,
        }
    }

    fn reserved() -> [&'static str; 4] {
        [GROUP_TOPIC_TYPE, OUTPUT_TOPIC_TYPE, MANAGER_TOPIC_TYPE, COLLECTOR_AGENT_TYPE]
    }
}

/// Holds the team's running flag for as long as it lives.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct ActiveRun {
    receiver: mpsc::UnboundedReceiver<ChatMessage>,
    /// Resolves to the run's stop reason once the runtime is idle
    shutdown: JoinHandle<RuntimeResult<Option<String>>>,
    messages: Vec<ChatMessage>,
    cancellation_token: CancellationToken,
    /// Cancels the run if the stream is dropped before it ends
    cancel_on_drop: DropGuard,
    started_at: DateTime<Utc>,
}

enum RunState {
    Pending {
        task: Option<String>,
        cancellation_token: CancellationToken,
    },
    Draining(Box<ActiveRun>),
    Done,
}

/// A team of participants that converse under a chat manager.
pub struct GroupChat {
    team_id: String,
    participants: Vec<Arc<dyn ChatAgent>>,
    manager_factory: Arc<dyn ChatManagerFactory>,
    termination_condition: Option<Arc<dyn TerminationCondition>>,
    message_thread: MessageThread,
    topics: TeamTopics,
    runtime: SingleThreadedRuntime<GroupChatEvent>,
    initialized: OnceCell<()>,
    running: Arc<AtomicBool>,
    output: OutputSink,
    stop_reason: StopReason,
}

impl GroupChat {
    /// Create a team. Fails if there are no participants or their names are
    /// empty, reserved or not unique.
    pub fn new(
        participants: Vec<Arc<dyn ChatAgent>>,
        manager_factory: Arc<dyn ChatManagerFactory>,
        termination_condition: Option<Arc<dyn TerminationCondition>>,
    ) -> TeamResult<Self> {
        validate_participants(&participants)?;

        let topics = TeamTopics::new(participants.iter().map(|p| p.name().to_string()).collect());
        let team_id = Uuid::new_v4().to_string();
        debug!(team_id = %team_id, participants = ?topics.participants, "Created group chat");

        Ok(Self {
            team_id,
            participants,
            manager_factory,
            termination_condition,
            message_thread: MessageThread::new(),
            topics,
            runtime: SingleThreadedRuntime::new(),
            initialized: OnceCell::new(),
            running: Arc::new(AtomicBool::new(false)),
            output: OutputSink::new(),
            stop_reason: StopReason::new(),
        })
    }

    /// Create a team whose participants speak in turn.
    pub fn round_robin(
        participants: Vec<Arc<dyn ChatAgent>>,
        termination_condition: Option<Arc<dyn TerminationCondition>>,
    ) -> TeamResult<Self> {
        Self::new(participants, Arc::new(RoundRobinManagerFactory), termination_condition)
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    pub fn topics(&self) -> &TeamTopics {
        &self.topics
    }

    pub fn participant_names(&self) -> &[String] {
        &self.topics.participants
    }

    pub fn termination_condition(&self) -> Option<&Arc<dyn TerminationCondition>> {
        self.termination_condition.as_ref()
    }

    /// The conversation so far, as seen by the chat manager.
    pub fn message_thread(&self) -> &MessageThread {
        &self.message_thread
    }

    /// The runtime hosting this team's agents.
    pub fn runtime(&self) -> &SingleThreadedRuntime<GroupChatEvent> {
        &self.runtime
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Whether a run or reset is in flight. A run stays in flight until the
    /// runtime has gone idle, even after its stream was dropped.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register all agents with the runtime. Runs at most once; concurrent
    /// callers wait for the first one.
    pub async fn ensure_initialized(&self) -> TeamResult<()> {
        self.initialized
            .get_or_try_init(|| self.register_agents())
            .await
            .map(|_| ())
    }

    async fn register_agents(&self) -> TeamResult<()> {
        let topics = &self.topics;

        for (participant, topic) in self.participants.iter().zip(&topics.participants) {
            let factory = participant_factory(
                AgentId::new(topic, &self.team_id),
                &topics.group,
                &topics.output,
                Arc::clone(participant),
            );
            self.runtime.register(topic, factory).await?;
            self.runtime.add_subscription(Subscription::by_type(topic, topic)).await?;
            self.runtime.add_subscription(Subscription::by_type(&topics.group, topic)).await?;
        }

        let context = ManagerContext {
            team_id: self.team_id.clone(),
            group_topic_type: topics.group.clone(),
            output_topic_type: topics.output.clone(),
            participant_topic_types: topics.participants.clone(),
            participant_descriptions: self
                .participants
                .iter()
                .map(|p| p.description().to_string())
                .collect(),
            message_thread: self.message_thread.clone(),
            termination_condition: self.termination_condition.clone(),
        };
        let manager_factory = Arc::clone(&self.manager_factory);
        self.runtime
            .register(
                &topics.manager,
                Arc::new(move |ctx: AgentInstantiationContext<GroupChatEvent>| {
                    manager_factory.create(ctx, context.clone())
                }),
            )
            .await?;
        self.runtime.add_subscription(Subscription::by_type(&topics.manager, &topics.manager)).await?;
        self.runtime.add_subscription(Subscription::by_type(&topics.group, &topics.manager)).await?;

        let (sink, stop_reason) = (self.output.clone(), self.stop_reason.clone());
        self.runtime
            .register(
                &topics.collector,
                Arc::new(move |ctx: AgentInstantiationContext<GroupChatEvent>| {
                    Box::new(OutputCollector::new(ctx.id, sink.clone(), stop_reason.clone()))
                        as Box<dyn Agent<GroupChatEvent>>
                }),
            )
            .await?;
        self.runtime.add_subscription(Subscription::by_type(&topics.output, &topics.collector)).await?;

        info!(
            team_id = %self.team_id,
            participants = topics.participants.len(),
            "Group chat initialized"
        );
        Ok(())
    }

    /// Run the team on a task and wait for the result.
    pub async fn run(
        &self,
        task: Option<String>,
        cancellation_token: Option<CancellationToken>,
    ) -> TeamResult<TaskResult> {
        let mut stream = self.run_stream(task, cancellation_token);
        while let Some(event) = stream.next().await {
            if let TaskEvent::Result(result) = event? {
                return Ok(result);
            }
        }
        panic!("The stream should have returned the final result.");
    }

    /// Run the team on a task, yielding each message as it is produced and
    /// the [`TaskResult`] last.
    ///
    /// Nothing happens until the stream is first polled. Dropping the stream
    /// mid-run cancels the conversation; the team accepts the next run once
    /// the runtime has gone idle.
    pub fn run_stream(
        &self,
        task: Option<String>,
        cancellation_token: Option<CancellationToken>,
    ) -> BoxStream<'_, TeamResult<TaskEvent>> {
        let initial = RunState::Pending {
            task,
            cancellation_token: cancellation_token.unwrap_or_default(),
        };
        stream::unfold(initial, move |state| self.advance(state)).boxed()
    }

    /// Clear all per-run state of the manager and the participants.
    pub async fn reset(&self) -> TeamResult<()> {
        if !self.is_initialized() {
            return Err(TeamError::NotInitialized);
        }
        let _guard = RunGuard::acquire(&self.running).ok_or(TeamError::Running)?;

        self.runtime.start();
        self.runtime
            .publish_message(
                GroupChatEvent::Reset,
                self.topic(&self.topics.group),
                None,
                CancellationToken::new(),
            )
            .await?;
        self.runtime.stop_when_idle().await?;
        self.stop_reason.clear().await;

        info!(team_id = %self.team_id, "Group chat reset");
        Ok(())
    }

    fn topic(&self, topic_type: &str) -> TopicId {
        TopicId::new(topic_type, &self.team_id)
    }

    async fn advance(&self, state: RunState) -> Option<(TeamResult<TaskEvent>, RunState)> {
        match state {
            RunState::Pending {
                task,
                cancellation_token,
            } => match self.begin_run(task, cancellation_token).await {
                Ok(run) => Some(self.next_event(run).await),
                Err(e) => Some((Err(e), RunState::Done)),
            },
            RunState::Draining(run) => Some(self.next_event(*run).await),
            RunState::Done => None,
        }
    }

    async fn begin_run(
        &self,
        task: Option<String>,
        cancellation_token: CancellationToken,
    ) -> TeamResult<ActiveRun> {
        if cancellation_token.is_cancelled() {
            return Err(TeamError::Cancelled);
        }
        let guard = RunGuard::acquire(&self.running).ok_or(TeamError::AlreadyRunning)?;
        let cancellation_token = cancellation_token.child_token();

        self.runtime.start();
        self.ensure_initialized().await?;
        self.stop_reason.clear().await;
        let (run_number, receiver) = self.output.open().await;

        let task = task.map(ChatMessage::task);
        info!(team_id = %self.team_id, run = run_number, has_task = task.is_some(), "Starting run");
        self.runtime
            .publish_message(
                GroupChatEvent::Start { message: task },
                self.topic(&self.topics.group),
                None,
                cancellation_token.clone(),
            )
            .await?;

        let shutdown = tokio::spawn(watch_for_idle(
            self.runtime.clone(),
            self.output.clone(),
            self.stop_reason.clone(),
            run_number,
            guard,
        ));

        Ok(ActiveRun {
            receiver,
            shutdown,
            messages: Vec::new(),
            cancel_on_drop: cancellation_token.clone().drop_guard(),
            cancellation_token,
            started_at: Utc::now(),
        })
    }

    async fn next_event(&self, mut run: ActiveRun) -> (TeamResult<TaskEvent>, RunState) {
        let received = tokio::select! {
            biased;
            _ = run.cancellation_token.cancelled() => None,
            message = run.receiver.recv() => Some(message),
        };

        match received {
            Some(Some(message)) => {
                run.messages.push(message.clone());
                (Ok(TaskEvent::Message(message)), RunState::Draining(Box::new(run)))
            }
            Some(None) => (self.finish_run(run).await, RunState::Done),
            None => (self.cancel_run(run).await, RunState::Done),
        }
    }

    async fn finish_run(&self, run: ActiveRun) -> TeamResult<TaskEvent> {
        let ActiveRun {
            shutdown,
            messages,
            cancel_on_drop,
            started_at,
            ..
        } = run;
        let stop_reason = join_watcher(shutdown).await?;
        cancel_on_drop.disarm();

        let result = TaskResult {
            messages,
            stop_reason,
            started_at,
            completed_at: Utc::now(),
        };
        info!(
            team_id = %self.team_id,
            messages = result.messages.len(),
            stop_reason = ?result.stop_reason,
            "Run completed"
        );
        Ok(TaskEvent::Result(result))
    }

    async fn cancel_run(&self, run: ActiveRun) -> TeamResult<TaskEvent> {
        warn!(team_id = %self.team_id, "Run cancelled, waiting for in-flight handlers");
        join_watcher(run.shutdown).await?;
        Err(TeamError::Cancelled)
    }
}

impl std::fmt::Debug for GroupChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupChat")
            .field("team_id", &self.team_id)
            .field("participants", &self.topics.participants)
            .field("initialized", &self.is_initialized())
            .field("running", &self.is_running())
            .finish()
    }
}

fn validate_participants(participants: &[Arc<dyn ChatAgent>]) -> TeamResult<()> {
    if participants.is_empty() {
        return Err(TeamError::Validation(
            "At least one participant is required.".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for participant in participants {
        let name = participant.name();
        if name.trim().is_empty() {
            return Err(TeamError::Validation(
                "Participant names must not be empty.".to_string(),
            ));
        }
        if TeamTopics::reserved().contains(&name) {
            return Err(TeamError::Validation(format!(
                "The participant name '{}' is reserved.",
                name
            )));
        }
        if !names.insert(name) {
            return Err(TeamError::Validation(
                "The participant names must be unique.".to_string(),
            ));
        }
    }
    Ok(())
}

/// Factory for the adapter hosting `agent`. The runtime must instantiate it
/// under `expected`.
fn participant_factory(
    expected: AgentId,
    group_topic_type: &str,
    output_topic_type: &str,
    agent: Arc<dyn ChatAgent>,
) -> AgentFactory<GroupChatEvent> {
    let group_topic_type = group_topic_type.to_string();
    let output_topic_type = output_topic_type.to_string();
    Arc::new(move |ctx: AgentInstantiationContext<GroupChatEvent>| {
        assert_eq!(
            ctx.id, expected,
            "participant adapter instantiated with an unexpected identity"
        );
        Box::new(ChatAgentContainer::new(
            ctx,
            &group_topic_type,
            &output_topic_type,
            Arc::clone(&agent),
        )) as Box<dyn Agent<GroupChatEvent>>
    })
}

/// Wait for the runtime to go idle, then end the run's output and release
/// the team. Returns the stop reason recorded during the run.
async fn watch_for_idle(
    runtime: SingleThreadedRuntime<GroupChatEvent>,
    output: OutputSink,
    stop_reason: StopReason,
    run_number: u64,
    guard: RunGuard,
) -> RuntimeResult<Option<String>> {
    let idle = AssertUnwindSafe(runtime.stop_when_idle()).catch_unwind().await;
    let reason = stop_reason.take().await;
    output.close(run_number).await;
    debug!(run = run_number, "Output closed");
    drop(guard);
    match idle {
        Ok(result) => result.map(|()| reason),
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

async fn join_watcher(
    watcher: JoinHandle<RuntimeResult<Option<String>>>,
) -> RuntimeResult<Option<String>> {
    match watcher.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(RuntimeError::Dispatcher(e.to_string())),
    }
}
