//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act on a codebase:
//! read and write files, list directories, search code, run commands.
//! The registry does no sandboxing of its own; filesystem tools validate
//! every path themselves.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::ToolError;
use crate::message::ToolCall;
use crate::provider::ToolDefinition;

/// The result of a tool execution.
///
/// A failed result always carries a non-empty error; use the constructors
/// rather than building the struct by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// Optional structured output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error description when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// A successful result carrying structured data.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A successful result carrying plain text.
    pub fn text(output: impl Into<String>) -> Self {
        Self::ok(serde_json::Value::String(output.into()))
    }

    /// A failed result. An empty message is replaced so the invariant holds.
    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            "unknown error".to_string()
        } else {
            error
        };
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    /// Render the result as the text the model will see.
    pub fn to_text(&self) -> String {
        if !self.success {
            return format!("Error: {}", self.error.as_deref().unwrap_or("unknown error"));
        }
        match &self.data {
            None | Some(serde_json::Value::Null) => "OK".to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}

impl From<ToolError> for ToolResult {
    fn from(err: ToolError) -> Self {
        Self::failure(err.to_string())
    }
}

/// A progress report emitted by a running tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Fraction complete, clamped to `[0, 1]`
    pub progress: f32,

    /// Short human-readable status
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
}

impl ProgressUpdate {
    pub fn new(progress: f32, status: impl Into<String>) -> Self {
        Self {
            progress: clamp_progress(progress),
            status: status.into(),
            step: None,
            total_steps: None,
        }
    }

    /// Progress expressed as `step` of `total_steps`.
    pub fn step(step: u32, total_steps: u32, status: impl Into<String>) -> Self {
        let progress = if total_steps == 0 {
            0.0
        } else {
            step as f32 / total_steps as f32
        };
        Self {
            progress: clamp_progress(progress),
            status: status.into(),
            step: Some(step),
            total_steps: Some(total_steps),
        }
    }
}

fn clamp_progress(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Receives progress reports keyed by tool call id.
pub trait ProgressSink: Send + Sync {
    fn report(&self, call_id: &str, update: ProgressUpdate);
}

/// Per-invocation context handed to [`Tool::execute`].
#[derive(Clone)]
pub struct ToolContext {
    call_id: String,
    cancel: CancellationToken,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl ToolContext {
    pub fn new(call_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            call_id: call_id.into(),
            cancel,
            progress: None,
        }
    }

    /// A context with its own token and no progress sink, for direct calls.
    pub fn detached() -> Self {
        Self::new("direct", CancellationToken::new())
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Forward a progress report, if anyone is listening.
    pub fn report(&self, update: ProgressUpdate) {
        if let Some(sink) = &self.progress {
            sink.report(&self.call_id, update);
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("call_id", &self.call_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// The core Tool trait.
///
/// Implementations must not panic on malformed arguments: return
/// [`ToolError::InvalidArguments`] instead. Long-running tools should check
/// [`ToolContext::is_cancelled`] or select on its token.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Built once at startup and shared read-only behind an `Arc`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if a tool with the same name already exists.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            warn!(tool = %name, "Duplicate tool registration rejected");
            return Err(ToolError::AlreadyRegistered(name));
        }
        debug!(tool = %name, "Tool registered");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All tools, sorted by name.
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<_> = self.tools.values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// Get all tool definitions (for sending to the LLM), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list().iter().map(|t| t.to_definition()).collect()
    }

    /// Decode a call's arguments and execute it.
    pub async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "Model called an unknown tool");
            return Err(ToolError::NotFound(call.name.clone()));
        };
        let arguments = call.parse_arguments()?;
        trace!(tool = %call.name, call_id = %call.id, "Dispatching tool call");
        tool.execute(ctx, arguments).await
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
