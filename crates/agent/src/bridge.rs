//! Event bridge — runs turns in the background and streams their events.
//!
//! `send` spawns one task per turn and returns at once. The task pushes
//! `ChatMessage`s onto a [`DropQueue`], so a slow consumer loses events
//! instead of stalling the run. `close` cancels every running turn, waits
//! for the tasks to exit and closes the queue; a consumer blocked on the
//! receiver then observes the end of the stream.
//!
//! Within a turn events are ordered: `user`, then for each tool call a
//! `tool_call` before its `tool_result`, and finally exactly one
//! `assistant` or `error` event. Dropped events leave gaps but never
//! reorder what is delivered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ferrocode_core::history::{HistoryStore, Session};
use ferrocode_core::message::{Message, ToolCall};
use ferrocode_core::tool::ProgressUpdate;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::events::{ChatMessage, ToolProgressState};
use crate::queue::DropQueue;
use crate::runner::{AgentRunner, RunObserver};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Event bridge is closed")]
    Closed,

    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("Turn tasks did not stop within {0:?}")]
    ShutdownTimeout(Duration),
}

type ActiveTools = Arc<Mutex<HashMap<String, ToolProgressState>>>;

pub struct EventBridge {
    runner: Arc<AgentRunner>,
    queue: Arc<DropQueue<ChatMessage>>,
    receiver: Mutex<Option<mpsc::Receiver<ChatMessage>>>,
    cancel: CancellationToken,
    tasks: TaskTracker,
    active: ActiveTools,
    session: Arc<tokio::sync::Mutex<Session>>,
    history: Option<Arc<dyn HistoryStore>>,
}

impl EventBridge {
    /// Create a bridge whose queue holds at most `buffer_size` events.
    pub fn new(runner: AgentRunner, buffer_size: usize) -> Self {
        let (queue, receiver) = DropQueue::bounded(buffer_size);
        let session = Session::new(runner.client().name(), runner.model());
        Self {
            runner: Arc::new(runner),
            queue: Arc::new(queue),
            receiver: Mutex::new(Some(receiver)),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            active: Arc::new(Mutex::new(HashMap::new())),
            session: Arc::new(tokio::sync::Mutex::new(session)),
            history: None,
        }
    }

    /// Persist the conversation to `store` after every turn.
    pub fn with_history(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(store);
        self
    }

    /// Continue an earlier session instead of starting a new one.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Arc::new(tokio::sync::Mutex::new(session));
        self
    }

    /// Start a turn. Returns as soon as the turn task is spawned.
    pub fn send(&self, prompt: &str) -> Result<(), BridgeError> {
        self.send_with(&CancellationToken::new(), prompt)
    }

    /// Start a turn that also stops when `cancel` fires. Cancelling one
    /// turn leaves the bridge open for the next.
    pub fn send_with(&self, cancel: &CancellationToken, prompt: &str) -> Result<(), BridgeError> {
        if self.cancel.is_cancelled() || self.queue.is_closed() {
            return Err(BridgeError::Closed);
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(BridgeError::EmptyPrompt);
        }

        self.queue.push(ChatMessage::user(prompt));

        let turn = Turn {
            runner: self.runner.clone(),
            queue: self.queue.clone(),
            active: self.active.clone(),
            session: self.session.clone(),
            history: self.history.clone(),
            cancel: self.cancel.child_token(),
            caller: cancel.clone(),
            prompt: prompt.to_string(),
        };
        self.tasks.spawn(turn.run());
        debug!(tasks = self.tasks.len(), "Turn spawned");
        Ok(())
    }

    /// Hand out the event receiver. Only the first caller gets it.
    pub fn messages(&self) -> Option<mpsc::Receiver<ChatMessage>> {
        self.receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Cancel running turns, wait for them to exit and close the queue.
    pub async fn close(&self) -> Result<(), BridgeError> {
        self.cancel.cancel();
        self.tasks.close();
        let waited = tokio::time::timeout(SHUTDOWN_GRACE, self.tasks.wait()).await;
        self.queue.close();
        info!(dropped = self.queue.dropped(), "Event bridge closed");
        match waited {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!("Turn tasks still running after shutdown grace period");
                Err(BridgeError::ShutdownTimeout(SHUTDOWN_GRACE))
            }
        }
    }

    /// Snapshot of the tools currently running, keyed by call id.
    pub fn active_tools(&self) -> HashMap<String, ToolProgressState> {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of events discarded because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    pub async fn session(&self) -> Session {
        self.session.lock().await.clone()
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Everything one spawned turn needs.
struct Turn {
    runner: Arc<AgentRunner>,
    queue: Arc<DropQueue<ChatMessage>>,
    active: ActiveTools,
    session: Arc<tokio::sync::Mutex<Session>>,
    history: Option<Arc<dyn HistoryStore>>,
    cancel: CancellationToken,
    /// Token of whoever started the turn
    caller: CancellationToken,
    prompt: String,
}

impl Turn {
    async fn run(self) {
        let prior = self.session.lock().await.messages.clone();
        let observer = Arc::new(BridgeObserver {
            queue: self.queue.clone(),
            active: self.active.clone(),
        });

        let run = self
            .runner
            .run_with(&self.cancel, &prior, &self.prompt, observer);
        tokio::pin!(run);
        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                _ = self.caller.cancelled(), if !self.cancel.is_cancelled() => {
                    debug!("Turn cancelled by caller");
                    self.cancel.cancel();
                }
            }
        };

        // Only the prompt and the answer are kept between turns.
        {
            let mut session = self.session.lock().await;
            session.push(Message::user(&self.prompt));
            if result.success {
                session.push(Message::assistant(&result.final_response));
            }
            if let Some(store) = &self.history {
                if let Err(e) = store.save(&session).await {
                    warn!(session = %session.id, error = %e, "Failed to save session");
                }
            }
        }

        let outcome = result.outcome();
        let last = match &result.error {
            None => ChatMessage::assistant(result.final_response),
            Some(err) => ChatMessage::error(err.to_string()),
        };
        self.queue.push(
            last.with_meta("outcome", outcome.as_str())
                .with_meta("iterations", result.iterations)
                .with_meta("tool_calls", result.tool_calls),
        );
    }
}

struct BridgeObserver {
    queue: Arc<DropQueue<ChatMessage>>,
    active: ActiveTools,
}

impl BridgeObserver {
    fn active(&self) -> std::sync::MutexGuard<'_, HashMap<String, ToolProgressState>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RunObserver for BridgeObserver {
    fn on_tool_start(&self, call: &ToolCall) {
        self.active()
            .insert(call.id.clone(), ToolProgressState::started(&call.name));
        self.queue.push(ChatMessage::tool_start(call));
    }

    fn on_tool_progress(&self, call: &ToolCall, update: &ProgressUpdate) {
        if let Some(state) = self.active().get_mut(&call.id) {
            state.apply(update);
        }
        self.queue
            .push(ChatMessage::tool_progress(&call.id, &call.name, update));
    }

    fn on_tool_complete(&self, call: &ToolCall, success: bool, output: &str) {
        self.active().remove(&call.id);
        self.queue.push(ChatMessage::tool_result(call, success, output));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChatMessageKind;
    use crate::test_helpers::*;
    use async_trait::async_trait;
    use ferrocode_core::error::HistoryError;
    use ferrocode_core::history::SessionSummary;
    use ferrocode_core::tool::ToolRegistry;

    fn bridge(steps: Vec<Step>, buffer: usize) -> (Arc<ScriptedClient>, EventBridge) {
        let client = Arc::new(ScriptedClient::new(steps));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        registry.register(Arc::new(SlowTool)).unwrap();
        let runner = AgentRunner::new(client.clone(), Arc::new(registry), "mock-model");
        (client, EventBridge::new(runner, buffer))
    }

    async fn collect_turn(rx: &mut mpsc::Receiver<ChatMessage>) -> Vec<ChatMessage> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = event.kind.is_terminal();
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[derive(Default)]
    struct MemoryHistory {
        saved: Mutex<Vec<Session>>,
    }

    #[async_trait]
    impl HistoryStore for MemoryHistory {
        fn name(&self) -> &str {
            "memory"
        }
        async fn save(&self, session: &Session) -> Result<(), HistoryError> {
            self.saved.lock().unwrap().push(session.clone());
            Ok(())
        }
        async fn load(&self, id: &str) -> Result<Session, HistoryError> {
            Err(HistoryError::NotFound(id.to_string()))
        }
        async fn list(&self) -> Result<Vec<SessionSummary>, HistoryError> {
            Ok(Vec::new())
        }
        async fn delete(&self, _id: &str) -> Result<bool, HistoryError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn turn_events_are_ordered() {
        let (_client, bridge) = bridge(
            vec![call("echo", serde_json::json!({"text": "hi"})), text("done")],
            64,
        );
        let mut rx = bridge.messages().unwrap();
        assert!(bridge.messages().is_none());

        bridge.send("say hi").unwrap();
        let events = collect_turn(&mut rx).await;
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChatMessageKind::User,
                ChatMessageKind::ToolCall,
                ChatMessageKind::ToolProgress,
                ChatMessageKind::ToolResult,
                ChatMessageKind::Assistant,
            ]
        );
        assert_eq!(events[1].meta("call_id"), events[3].meta("call_id"));
        assert_eq!(events[3].text, "hi");
        assert_eq!(events[4].text, "done");
        assert_eq!(events[4].meta("outcome"), Some("answered"));
        assert!(bridge.active_tools().is_empty());
        bridge.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_run_ends_with_error_event() {
        let (_client, bridge) = bridge(
            vec![Step::Fail(ferrocode_core::error::ProviderError::Network("down".into()))],
            64,
        );
        let mut rx = bridge.messages().unwrap();
        bridge.send("hello").unwrap();
        let events = collect_turn(&mut rx).await;
        let last = events.last().unwrap();
        assert_eq!(last.kind, ChatMessageKind::Error);
        assert!(last.text.contains("down"));
        assert_eq!(last.meta("outcome"), Some("aborted"));
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected() {
        let (_client, bridge) = bridge(vec![], 8);
        assert!(matches!(bridge.send("   "), Err(BridgeError::EmptyPrompt)));
    }

    #[tokio::test]
    async fn close_ends_the_stream_and_later_events_are_dropped() {
        let (_client, bridge) = bridge(vec![], 8);
        let mut rx = bridge.messages().unwrap();
        bridge.close().await.unwrap();

        assert!(matches!(bridge.send("too late"), Err(BridgeError::Closed)));
        bridge.queue.push(ChatMessage::system("after close"));
        assert_eq!(bridge.dropped(), 1);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_cancels_a_turn_in_flight() {
        let (_client, bridge) = bridge(vec![call("slow", serde_json::json!({}))], 64);
        let mut rx = bridge.messages().unwrap();
        bridge.send("wait forever").unwrap();

        // Wait until the tool is running.
        let start = rx.recv().await.unwrap();
        assert_eq!(start.kind, ChatMessageKind::User);
        let tool = rx.recv().await.unwrap();
        assert_eq!(tool.kind, ChatMessageKind::ToolCall);
        assert_eq!(bridge.active_tools().len(), 1);

        bridge.close().await.unwrap();

        let mut rest = Vec::new();
        while let Some(event) = rx.recv().await {
            rest.push(event);
        }
        let last = rest.last().unwrap();
        assert_eq!(last.kind, ChatMessageKind::Error);
        assert_eq!(last.text, "Run cancelled");
    }

    #[tokio::test]
    async fn caller_cancels_one_turn_and_the_bridge_stays_open() {
        let (_client, bridge) = bridge(vec![Step::Hang, text("still here")], 64);
        let mut rx = bridge.messages().unwrap();

        let turn = CancellationToken::new();
        bridge.send_with(&turn, "think forever").unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, ChatMessageKind::User);
        turn.cancel();
        let events = collect_turn(&mut rx).await;
        let last = events.last().unwrap();
        assert_eq!(last.kind, ChatMessageKind::Error);
        assert_eq!(last.text, "Run cancelled");

        bridge.send("are you there?").unwrap();
        let events = collect_turn(&mut rx).await;
        assert_eq!(events.last().unwrap().kind, ChatMessageKind::Assistant);
        assert_eq!(events.last().unwrap().text, "still here");

        let session = bridge.session().await;
        assert_eq!(session.messages.len(), 3);
        bridge.close().await.unwrap();
    }

    #[tokio::test]
    async fn slow_consumer_loses_events_but_the_run_completes() {
        let (_client, bridge) = bridge(
            vec![call("echo", serde_json::json!({"text": "hi"})), text("done")],
            2,
        );
        let history = Arc::new(MemoryHistory::default());
        let bridge = bridge.with_history(history.clone());
        let mut rx = bridge.messages().unwrap();
        bridge.send("hi").unwrap();

        for _ in 0..200 {
            if !history.saved.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        bridge.close().await.unwrap();

        let saved = history.saved.lock().unwrap().clone();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].messages.last().unwrap().content, "done");
        // user + tool_call + tool_progress + tool_result + assistant, two fit
        assert_eq!(bridge.dropped(), 3);

        let mut delivered = Vec::new();
        while let Some(event) = rx.recv().await {
            delivered.push(event.kind);
        }
        assert_eq!(delivered, vec![ChatMessageKind::User, ChatMessageKind::ToolCall]);
    }

    #[tokio::test]
    async fn later_turns_see_earlier_ones() {
        let (client, bridge) = bridge(vec![text("Noted."), text("Blue.")], 64);
        let history = Arc::new(MemoryHistory::default());
        let bridge = bridge.with_history(history.clone());
        let mut rx = bridge.messages().unwrap();

        bridge.send("My favourite colour is blue.").unwrap();
        collect_turn(&mut rx).await;
        bridge.send("What is my favourite colour?").unwrap();
        let events = collect_turn(&mut rx).await;
        assert_eq!(events.last().unwrap().text, "Blue.");

        let second_prompt = &client.requests()[1].prompt;
        assert!(second_prompt.contains("User: My favourite colour is blue."));
        assert!(second_prompt.contains("Assistant: Noted."));

        let session = bridge.session().await;
        assert_eq!(session.messages.len(), 4);
        assert_eq!(session.title, "My favourite colour is blue.");
        assert_eq!(history.saved.lock().unwrap().len(), 2);
    }
}
