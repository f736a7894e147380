//! Shared test helpers: a scripted LLM client and small stub tools.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ferrocode_core::error::{ProviderError, ToolError};
use ferrocode_core::message::ToolCall;
use ferrocode_core::provider::{FunctionCallResponse, LlmClient, LlmRequest};
use ferrocode_core::tool::{ProgressUpdate, Tool, ToolContext, ToolResult};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Step {
    Text(String),
    Call(ToolCall),
    Fail(ProviderError),
    /// Never answer until cancelled.
    Hang,
}

pub fn text(s: &str) -> Step {
    Step::Text(s.to_string())
}

pub fn call(name: &str, args: serde_json::Value) -> Step {
    Step::Call(ToolCall::new(name, args.to_string()))
}

pub fn raw_call(name: &str, raw_args: &str) -> Step {
    Step::Call(ToolCall::new(name, raw_args))
}

/// A client that replays a script, one step per call.
///
/// Panics if more calls are made than steps provided, unless built with
/// [`ScriptedClient::repeating`].
pub struct ScriptedClient {
    steps: Mutex<VecDeque<Step>>,
    repeat: Option<Step>,
    calls: AtomicUsize,
    requests: Mutex<Vec<LlmRequest>>,
    native: bool,
}

impl ScriptedClient {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            repeat: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            native: true,
        }
    }

    /// Answer every call with the same step.
    pub fn repeating(step: Step) -> Self {
        let mut client = Self::new(Vec::new());
        client.repeat = Some(step);
        client
    }

    pub fn text_mode(mut self) -> Self {
        self.native = false;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_step(&self, request: &LlmRequest) -> Step {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(step) = self.steps.lock().unwrap().pop_front() {
            return step;
        }
        match &self.repeat {
            Some(step) => step.clone(),
            None => panic!("ScriptedClient: no more steps (call #{n})"),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        cancel: &CancellationToken,
        request: &LlmRequest,
    ) -> Result<String, ProviderError> {
        match self.generate_with_functions(cancel, request).await? {
            FunctionCallResponse::Text(text) => Ok(text),
            FunctionCallResponse::FunctionCall(call) => Ok(call.arguments),
        }
    }

    async fn generate_with_functions(
        &self,
        cancel: &CancellationToken,
        request: &LlmRequest,
    ) -> Result<FunctionCallResponse, ProviderError> {
        match self.next_step(request) {
            Step::Text(text) => Ok(FunctionCallResponse::Text(text)),
            Step::Call(mut call) => {
                // Fresh id per call, as a real provider would do.
                call.id = ToolCall::new(call.name.clone(), "").id;
                Ok(FunctionCallResponse::FunctionCall(call))
            }
            Step::Fail(err) => Err(err),
            Step::Hang => {
                cancel.cancelled().await;
                Err(ProviderError::Cancelled)
            }
        }
    }

    async fn stream(
        &self,
        cancel: &CancellationToken,
        request: &LlmRequest,
        out: mpsc::Sender<String>,
    ) -> Result<(), ProviderError> {
        let text = self.generate(cancel, request).await?;
        for word in text.split_inclusive(' ') {
            if out.send(word.to_string()).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    fn supports_native_function_calling(&self) -> bool {
        self.native
    }
}

/// Returns its `text` argument unchanged.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the text argument"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let text = arguments
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".into()))?;
        ctx.report(ProgressUpdate::step(1, 1, "echoed"));
        Ok(ToolResult::text(text))
    }
}

/// Sleeps for an hour unless cancelled.
pub struct SlowTool;

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Takes a very long time"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        _arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        tokio::select! {
            _ = ctx.cancel_token().cancelled() => Err(ToolError::Cancelled("slow".into())),
            _ = tokio::time::sleep(std::time::Duration::from_secs(3600)) => Ok(ToolResult::text("finally")),
        }
    }
}

/// Emits coloured output with an embedded NUL byte.
pub struct NoisyTool;

#[async_trait]
impl Tool for NoisyTool {
    fn name(&self) -> &str {
        "noisy"
    }

    fn description(&self) -> &str {
        "Prints terminal escape codes"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        _arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::text("\x1b[31mERROR\x1b[0m: disk\0 full"))
    }
}
