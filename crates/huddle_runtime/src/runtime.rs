//! Single-dispatcher agent runtime.
//!
//! [`SingleThreadedRuntime`] delivers published messages to every agent
//! subscribed to the topic. One dispatcher task drains the queue in publish
//! order, and all recipients of an envelope finish handling it before the
//! next envelope is dispatched. Handlers therefore never interleave with one
//! another, and delivery order on any topic equals publish order.
//!
//! Handlers that publish while running only enqueue, so the pending count
//! never drops to zero while a conversation is still producing messages.
//! [`AgentRuntime::stop_when_idle`] relies on this to detect the end of work.
//!
//! # Failure handling
//!
//! - A handler returning an error is logged and dispatch continues.
//! - A handler panic is caught, the runtime keeps draining until idle, and
//!   the panic is resumed in the caller of `stop_when_idle`.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::agent::{
    Agent, AgentFactory, AgentInstantiationContext, Message, MessageContext, MessagePublisher,
};
use crate::error::{RuntimeError, RuntimeResult};
use crate::id::{AgentId, TopicId};
use crate::registry::AgentRegistry;
use crate::subscription::Subscription;

/// Capabilities a message bus must offer to host agents.
#[async_trait]
pub trait AgentRuntime<M: Message>: MessagePublisher<M> {
    /// Register a factory for an agent type. Each type can be registered once.
    async fn register(&self, agent_type: &str, factory: AgentFactory<M>) -> RuntimeResult<()>;

    /// Route topics matched by `subscription` to its agent type.
    async fn add_subscription(&self, subscription: Subscription) -> RuntimeResult<()>;

    /// Begin dispatching. Starting a started runtime is a no-op.
    fn start(&self);

    /// Wait until no dispatch work is pending, then stop dispatching.
    async fn stop_when_idle(&self) -> RuntimeResult<()>;
}

struct Envelope<M> {
    message: M,
    topic_id: TopicId,
    sender: Option<AgentId>,
    cancellation_token: CancellationToken,
}

type SharedAgent<M> = Arc<Mutex<Box<dyn Agent<M>>>>;
type Inbox<M> = mpsc::UnboundedReceiver<Envelope<M>>;

enum Dispatcher<M> {
    Stopped(Inbox<M>),
    Running {
        stop: CancellationToken,
        handle: JoinHandle<Inbox<M>>,
    },
    /// Dispatcher task is winding down; `restart` records a `start` that
    /// arrived in the meantime.
    Stopping { restart: bool },
}

struct Inner<M: Message> {
    registry: RwLock<AgentRegistry<M>>,
    instances: RwLock<HashMap<AgentId, SharedAgent<M>>>,
    queue: mpsc::UnboundedSender<Envelope<M>>,
    pending: watch::Sender<usize>,
    dispatcher: StdMutex<Dispatcher<M>>,
    panic: StdMutex<Option<Box<dyn Any + Send>>>,
}

impl<M: Message> Inner<M> {
    fn enqueue(&self, envelope: Envelope<M>) -> RuntimeResult<()> {
        debug!(topic = %envelope.topic_id, sender = ?envelope.sender, "Publishing message");
        self.pending.send_modify(|n| *n += 1);
        if self.queue.send(envelope).is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            return Err(RuntimeError::Closed);
        }
        Ok(())
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// In-process runtime with a single dispatcher task.
///
/// Cloning is cheap and yields a handle to the same runtime. `start` must be
/// called from within a tokio runtime.
pub struct SingleThreadedRuntime<M: Message> {
    inner: Arc<Inner<M>>,
}

impl<M: Message> Clone for SingleThreadedRuntime<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Message> Default for SingleThreadedRuntime<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Message> SingleThreadedRuntime<M> {
    /// Create a stopped runtime with no registered agents.
    pub fn new() -> Self {
        let (queue, inbox) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(AgentRegistry::new()),
                instances: RwLock::new(HashMap::new()),
                queue,
                pending,
                dispatcher: StdMutex::new(Dispatcher::Stopped(inbox)),
                panic: StdMutex::new(None),
            }),
        }
    }

    /// Publish a message without a sender or cancellation signal.
    pub async fn publish(&self, message: M, topic_id: TopicId) -> RuntimeResult<()> {
        self.inner.enqueue(Envelope {
            message,
            topic_id,
            sender: None,
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Whether the dispatcher task is running.
    pub fn is_running(&self) -> bool {
        matches!(*lock(&self.inner.dispatcher), Dispatcher::Running { .. })
    }

    /// Number of published messages not yet fully handled.
    pub fn pending(&self) -> usize {
        *self.inner.pending.borrow()
    }

    /// Registered agent types, sorted.
    pub async fn registered_types(&self) -> Vec<String> {
        self.inner.registry.read().await.types()
    }

    pub async fn subscription_count(&self) -> usize {
        self.inner.registry.read().await.subscriptions().len()
    }

    /// Number of agent instances created so far.
    pub async fn instance_count(&self) -> usize {
        self.inner.instances.read().await.len()
    }

    fn spawn_dispatcher(&self, inbox: Inbox<M>) -> Dispatcher<M> {
        let stop = CancellationToken::new();
        let handle = tokio::spawn(self.clone().dispatch_loop(inbox, stop.clone()));
        Dispatcher::Running { stop, handle }
    }

    async fn dispatch_loop(self, mut inbox: Inbox<M>, stop: CancellationToken) -> Inbox<M> {
        loop {
            tokio::select! {
                biased;
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => {
                        self.dispatch(envelope).await;
                        self.inner.pending.send_modify(|n| *n = n.saturating_sub(1));
                    }
                    None => break,
                },
                _ = stop.cancelled() => break,
            }
        }
        inbox
    }

    async fn dispatch(&self, envelope: Envelope<M>) {
        let recipients = self.inner.registry.read().await.recipients(&envelope.topic_id);
        if recipients.is_empty() {
            debug!(topic = %envelope.topic_id, "No subscribers for topic");
        }

        for agent_id in recipients {
            // Publishers do not receive their own messages.
            if envelope.sender.as_ref() == Some(&agent_id) {
                continue;
            }

            let ctx = MessageContext {
                sender: envelope.sender.clone(),
                topic_id: envelope.topic_id.clone(),
                cancellation_token: envelope.cancellation_token.clone(),
            };
            let delivery = self.deliver(&agent_id, envelope.message.clone(), ctx);

            match AssertUnwindSafe(delivery).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(agent = %agent_id, topic = %envelope.topic_id, "Handler failed: {}", e);
                }
                Err(payload) => {
                    error!(
                        agent = %agent_id,
                        topic = %envelope.topic_id,
                        "Handler panicked: {}",
                        panic_message(payload.as_ref())
                    );
                    let mut slot = lock(&self.inner.panic);
                    if slot.is_none() {
                        *slot = Some(payload);
                    }
                }
            }
        }
    }

    async fn deliver(&self, agent_id: &AgentId, message: M, ctx: MessageContext) -> RuntimeResult<()> {
        let agent = self.instance(agent_id).await?;
        let mut agent = agent.lock().await;
        debug!(agent = %agent_id, topic = %ctx.topic_id, "Delivering message");
        agent.on_message(message, ctx).await
    }

    async fn instance(&self, agent_id: &AgentId) -> RuntimeResult<SharedAgent<M>> {
        if let Some(agent) = self.inner.instances.read().await.get(agent_id) {
            return Ok(Arc::clone(agent));
        }

        let factory = self
            .inner
            .registry
            .read()
            .await
            .factory_required(&agent_id.agent_type)?;
        let ctx = AgentInstantiationContext {
            id: agent_id.clone(),
            publisher: Arc::new(RuntimeHandle {
                inner: Arc::downgrade(&self.inner),
            }),
        };
        let agent = factory(ctx);
        // Routing relies on this; a factory that lies is a programming error.
        assert_eq!(
            agent.id(),
            agent_id,
            "Agent identity mismatch: factory for {} produced {}",
            agent_id,
            agent.id()
        );

        debug!(agent = %agent_id, "Instantiated agent");
        let agent = Arc::new(Mutex::new(agent));
        self.inner
            .instances
            .write()
            .await
            .insert(agent_id.clone(), Arc::clone(&agent));
        Ok(agent)
    }

    async fn stop(&self) -> RuntimeResult<()> {
        let running = {
            let mut state = lock(&self.inner.dispatcher);
            match std::mem::replace(&mut *state, Dispatcher::Stopping { restart: false }) {
                Dispatcher::Running { stop, handle } => Some((stop, handle)),
                other => {
                    *state = other;
                    None
                }
            }
        };
        let Some((stop, handle)) = running else {
            return Ok(());
        };

        stop.cancel();
        let inbox = handle
            .await
            .map_err(|e| RuntimeError::Dispatcher(e.to_string()))?;

        let mut state = lock(&self.inner.dispatcher);
        if matches!(*state, Dispatcher::Stopping { restart: true }) {
            debug!("Restarting dispatcher requested during stop");
            *state = self.spawn_dispatcher(inbox);
        } else {
            info!("Runtime stopped");
            *state = Dispatcher::Stopped(inbox);
        }
        Ok(())
    }
}

#[async_trait]
impl<M: Message> MessagePublisher<M> for SingleThreadedRuntime<M> {
    async fn publish_message(
        &self,
        message: M,
        topic_id: TopicId,
        sender: Option<AgentId>,
        cancellation_token: CancellationToken,
    ) -> RuntimeResult<()> {
        self.inner.enqueue(Envelope {
            message,
            topic_id,
            sender,
            cancellation_token,
        })
    }
}

#[async_trait]
impl<M: Message> AgentRuntime<M> for SingleThreadedRuntime<M> {
    async fn register(&self, agent_type: &str, factory: AgentFactory<M>) -> RuntimeResult<()> {
        self.inner.registry.write().await.register(agent_type, factory)
    }

    async fn add_subscription(&self, subscription: Subscription) -> RuntimeResult<()> {
        self.inner.registry.write().await.add_subscription(subscription)
    }

    fn start(&self) {
        let mut state = lock(&self.inner.dispatcher);
        let previous = std::mem::replace(&mut *state, Dispatcher::Stopping { restart: false });
        *state = match previous {
            Dispatcher::Stopped(inbox) => {
                info!("Runtime started");
                self.spawn_dispatcher(inbox)
            }
            Dispatcher::Stopping { .. } => Dispatcher::Stopping { restart: true },
            running @ Dispatcher::Running { .. } => running,
        };
    }

    async fn stop_when_idle(&self) -> RuntimeResult<()> {
        {
            let state = lock(&self.inner.dispatcher);
            if matches!(*state, Dispatcher::Stopped(_)) {
                let pending = self.pending();
                if pending > 0 {
                    return Err(RuntimeError::NotStarted(pending));
                }
                return Ok(());
            }
        }

        let mut idle = self.inner.pending.subscribe();
        loop {
            idle.wait_for(|pending| *pending == 0)
                .await
                .map_err(|_| RuntimeError::Closed)?;
            debug!("Runtime idle");
            self.stop().await?;

            // A publish that raced with the stop must not be stranded.
            if self.pending() == 0 {
                break;
            }
            debug!(pending = self.pending(), "Work arrived while stopping, resuming dispatch");
            self.start();
        }

        let panic = lock(&self.inner.panic).take();
        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }
        Ok(())
    }
}

impl<M: Message> std::fmt::Debug for SingleThreadedRuntime<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleThreadedRuntime")
            .field("running", &self.is_running())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Publisher handed to agents. Holds the runtime weakly so agent instances
/// do not keep their own runtime alive.
struct RuntimeHandle<M: Message> {
    inner: Weak<Inner<M>>,
}

#[async_trait]
impl<M: Message> MessagePublisher<M> for RuntimeHandle<M> {
    async fn publish_message(
        &self,
        message: M,
        topic_id: TopicId,
        sender: Option<AgentId>,
        cancellation_token: CancellationToken,
    ) -> RuntimeResult<()> {
        let inner = self.inner.upgrade().ok_or(RuntimeError::Closed)?;
        inner.enqueue(Envelope {
            message,
            topic_id,
            sender,
            cancellation_token,
        })
    }
}
