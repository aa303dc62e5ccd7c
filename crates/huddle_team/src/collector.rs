//! Collection of a run's output.

use std::sync::Arc;

use async_trait::async_trait;
use huddle_runtime::{Agent, AgentId, MessageContext, RuntimeResult};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::events::GroupChatEvent;
use crate::types::ChatMessage;

/// Where collected messages go.
///
/// The team opens a fresh channel at the start of every run and closes it
/// once the runtime is idle, so the receiver sees end-of-run exactly once.
/// Each channel is tagged with a run number; closing a run that is no longer
/// current leaves the current channel alone.
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    state: Arc<Mutex<SinkState>>,
}

#[derive(Debug, Default)]
struct SinkState {
    runs: u64,
    current: Option<(u64, mpsc::UnboundedSender<ChatMessage>)>,
}

impl OutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new channel for a run, replacing any previous one. Returns the
    /// run number and the receiving end.
    pub async fn open(&self) -> (u64, mpsc::UnboundedReceiver<ChatMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;
        state.runs += 1;
        let run = state.runs;
        state.current = Some((run, sender));
        (run, receiver)
    }

    /// Close the channel of `run`. Its receiver drains what is queued and
    /// then sees the end of the run.
    pub async fn close(&self, run: u64) {
        let mut state = self.state.lock().await;
        if matches!(state.current, Some((current, _)) if current == run) {
            state.current = None;
        } else {
            debug!(run, "Output channel already replaced");
        }
    }

    pub async fn is_open(&self) -> bool {
        self.state.lock().await.current.is_some()
    }

    async fn push(&self, message: ChatMessage) {
        match self.state.lock().await.current.as_ref() {
            Some((_, sender)) => {
                if sender.send(message).is_err() {
                    debug!("Output receiver dropped; discarding message");
                }
            }
            None => warn!(source = %message.source, "No run in progress; discarding output"),
        }
    }
}

/// The stop reason recorded for the current run.
#[derive(Debug, Clone, Default)]
pub struct StopReason {
    reason: Arc<Mutex<Option<String>>>,
}

impl StopReason {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, reason: impl Into<String>) {
        *self.reason.lock().await = Some(reason.into());
    }

    pub async fn get(&self) -> Option<String> {
        self.reason.lock().await.clone()
    }

    /// Remove and return the recorded reason.
    pub async fn take(&self) -> Option<String> {
        self.reason.lock().await.take()
    }

    pub async fn clear(&self) {
        self.reason.lock().await.take();
    }
}

/// Agent subscribed to the output topic.
///
/// Chat messages go to the [`OutputSink`]. A termination only records its
/// reason.
pub struct OutputCollector {
    id: AgentId,
    sink: OutputSink,
    stop_reason: StopReason,
}

impl OutputCollector {
    pub fn new(id: AgentId, sink: OutputSink, stop_reason: StopReason) -> Self {
        Self {
            id,
            sink,
            stop_reason,
        }
    }
}

#[async_trait]
impl Agent<GroupChatEvent> for OutputCollector {
    fn id(&self) -> &AgentId {
        &self.id
    }

    async fn on_message(&mut self, event: GroupChatEvent, _ctx: MessageContext) -> RuntimeResult<()> {
        match event {
            GroupChatEvent::Start { message: Some(message) } | GroupChatEvent::Message { message } => {
                self.sink.push(message).await;
            }
            GroupChatEvent::Start { message: None } => {}
            GroupChatEvent::Termination { message } => {
                debug!(reason = %message.content, "Recording stop reason");
                self.stop_reason.set(message.content).await;
            }
            other => panic!("Unexpected event on the output topic: {}", other.kind()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_runtime::{CancellationToken, TopicId};

    fn ctx() -> MessageContext {
        MessageContext {
            sender: None,
            topic_id: TopicId::new("output_topic", "team"),
            cancellation_token: CancellationToken::new(),
        }
    }

    fn collector() -> (OutputCollector, OutputSink, StopReason) {
        let sink = OutputSink::new();
        let stop_reason = StopReason::new();
        let collector = OutputCollector::new(
            AgentId::new("collect_output_messages", "team"),
            sink.clone(),
            stop_reason.clone(),
        );
        (collector, sink, stop_reason)
    }

    #[tokio::test]
    async fn test_collects_messages_in_order() {
        let (mut collector, sink, stop_reason) = collector();
        let (run, mut receiver) = sink.open().await;

        collector
            .on_message(GroupChatEvent::Start { message: Some(ChatMessage::task("Hello")) }, ctx())
            .await
            .unwrap();
        collector.on_message(GroupChatEvent::Start { message: None }, ctx()).await.unwrap();
        collector
            .on_message(GroupChatEvent::Message { message: ChatMessage::text("a", "hi") }, ctx())
            .await
            .unwrap();
        collector
            .on_message(
                GroupChatEvent::Termination { message: ChatMessage::stop("cond", "enough") },
                ctx(),
            )
            .await
            .unwrap();
        sink.close(run).await;

        assert_eq!(receiver.recv().await.unwrap().content, "Hello");
        assert_eq!(receiver.recv().await.unwrap().content, "hi");
        assert!(receiver.recv().await.is_none());
        assert_eq!(stop_reason.take().await.as_deref(), Some("enough"));
        assert!(stop_reason.get().await.is_none());
    }

    #[tokio::test]
    async fn test_sink_reopen_isolates_runs() {
        let sink = OutputSink::new();
        let (first_run, mut first) = sink.open().await;
        let (second_run, mut second) = sink.open().await;
        assert!(sink.is_open().await);

        sink.push(ChatMessage::text("a", "late")).await;
        // A stale run cannot close the current channel.
        sink.close(first_run).await;
        assert!(sink.is_open().await);
        sink.close(second_run).await;

        assert!(first.recv().await.is_none());
        assert_eq!(second.recv().await.unwrap().content, "late");
        assert!(!sink.is_open().await);
    }

    #[tokio::test]
    #[should_panic(expected = "Unexpected event on the output topic: reset")]
    async fn test_unexpected_event_panics() {
        let (mut collector, _sink, _stop) = collector();
        let _ = collector.on_message(GroupChatEvent::Reset, ctx()).await;
    }
}
