//! Integration tests for the agent runtime.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use huddle_runtime::{
    Agent, AgentFactory, AgentId, AgentInstantiationContext, AgentRuntime, MessageContext,
    MessagePublisher, RuntimeResult, SingleThreadedRuntime, Subscription, TopicId,
};

type Log = Arc<Mutex<Vec<String>>>;

/// Records every delivery as `agent <- topic: message`.
struct Recorder {
    id: AgentId,
    log: Log,
}

#[async_trait]
impl Agent<String> for Recorder {
    fn id(&self) -> &AgentId {
        &self.id
    }

    async fn on_message(&mut self, message: String, ctx: MessageContext) -> RuntimeResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} <- {}: {}", self.id, ctx.topic_id.topic_type, message));
        Ok(())
    }
}

/// Answers each message on `reply_to`, then records it.
struct Responder {
    id: AgentId,
    reply_to: String,
    publisher: Arc<dyn MessagePublisher<String>>,
}

#[async_trait]
impl Agent<String> for Responder {
    fn id(&self) -> &AgentId {
        &self.id
    }

    async fn on_message(&mut self, message: String, ctx: MessageContext) -> RuntimeResult<()> {
        self.publisher
            .publish_message(
                format!("re: {}", message),
                TopicId::new(&self.reply_to, &ctx.topic_id.source),
                Some(self.id.clone()),
                ctx.cancellation_token,
            )
            .await
    }
}

fn recorder(log: &Log) -> AgentFactory<String> {
    let log = Arc::clone(log);
    Arc::new(move |ctx: AgentInstantiationContext<String>| {
        Box::new(Recorder {
            id: ctx.id,
            log: Arc::clone(&log),
        }) as Box<dyn Agent<String>>
    })
}

fn responder(reply_to: &str) -> AgentFactory<String> {
    let reply_to = reply_to.to_string();
    Arc::new(move |ctx: AgentInstantiationContext<String>| {
        Box::new(Responder {
            id: ctx.id,
            reply_to: reply_to.clone(),
            publisher: ctx.publisher,
        }) as Box<dyn Agent<String>>
    })
}

/// Broadcast to several subscribers keeps publish order on every topic.
#[tokio::test]
async fn test_broadcast_and_reply_ordering() {
    let runtime = SingleThreadedRuntime::<String>::new();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    runtime.register("audit", recorder(&log)).await.unwrap();
    runtime.register("echo", responder("replies")).await.unwrap();
    runtime.add_subscription(Subscription::by_prefix("news", "audit")).await.unwrap();
    runtime.add_subscription(Subscription::by_type("replies", "audit")).await.unwrap();
    runtime.add_subscription(Subscription::by_type("news", "echo")).await.unwrap();

    runtime.start();
    for n in 1..=3 {
        runtime.publish(format!("m{}", n), TopicId::new("news", "s")).await.unwrap();
    }
    runtime.publish("sports".to_string(), TopicId::new("news.sports", "s")).await.unwrap();
    runtime.stop_when_idle().await.unwrap();

    let log = log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec![
            "audit/s <- news: m1",
            "audit/s <- news: m2",
            "audit/s <- news: m3",
            "audit/s <- news.sports: sports",
            "audit/s <- replies: re: m1",
            "audit/s <- replies: re: m2",
            "audit/s <- replies: re: m3",
        ]
    );
    assert_eq!(runtime.instance_count().await, 2);
}

/// Concurrent idle waits all return once the work is done, and a later
/// publish still gets delivered.
#[tokio::test]
async fn test_concurrent_stop_when_idle() {
    let runtime = SingleThreadedRuntime::<String>::new();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    runtime.register("audit", recorder(&log)).await.unwrap();
    runtime.add_subscription(Subscription::by_type("in", "audit")).await.unwrap();

    runtime.start();
    runtime.publish("first".to_string(), TopicId::new("in", "k")).await.unwrap();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.stop_when_idle().await })
        })
        .collect();
    for waiter in waiters {
        waiter.await.unwrap().unwrap();
    }

    runtime.start();
    runtime.publish("second".to_string(), TopicId::new("in", "k")).await.unwrap();
    runtime.stop_when_idle().await.unwrap();

    assert_eq!(log.lock().unwrap().len(), 2);
    assert!(!runtime.is_running());
}
