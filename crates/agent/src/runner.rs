//! The agent run loop.
//!
//! One run drives the model from a prompt to a final answer:
//!
//! 1. **Render** the conversation into a prompt for the backend
//! 2. **Call** the LLM with the tool catalogue
//! 3. **If a function call**: execute the tool, append its sanitized
//!    output, loop back to step 1
//! 4. **If text**: that is the final answer
//!
//! Tool problems (unknown tool, bad arguments, failures, timeouts) are
//! folded into the conversation so the model can recover. Transport
//! failures, cancellation, timeouts on the LLM call or the whole run, and
//! the iteration cap end the run.

use std::sync::Arc;
use std::time::Duration;

use ferrocode_config::{AgentSettings, AppConfig};
use ferrocode_core::error::{ProviderError, ToolError};
use ferrocode_core::message::{Message, Role, ToolCall};
use ferrocode_core::provider::{FunctionCallResponse, LlmClient, LlmRequest};
use ferrocode_core::tool::{ProgressSink, ProgressUpdate, ToolContext, ToolRegistry, ToolResult};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::prompt::PromptRenderer;
use crate::sanitize::sanitize_output;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are ferrocode, a careful coding assistant working inside the user's project. \
Use the available tools to read and search the code before answering, and to make the changes you are asked for. \
Keep answers concise and reference files by their workspace-relative path.";

/// Why a run ended without an answer.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error("Reached the iteration limit of {limit} without a final answer")]
    IterationLimit { limit: u32 },

    #[error("LLM request failed: {0}")]
    Transport(ProviderError),

    #[error("LLM call timed out after {timeout_secs}s")]
    LlmTimeout { timeout_secs: u64 },

    #[error("Run timed out after {timeout_secs}s")]
    RunTimeout { timeout_secs: u64 },

    #[error("Run cancelled")]
    Cancelled,
}

/// What the user should be told about a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model answered and every tool call succeeded.
    Answered,
    /// The model answered after at least one tool call failed.
    Recovered,
    /// The run ended without an answer.
    Aborted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::Recovered => "recovered",
            Self::Aborted => "aborted",
        }
    }
}

/// Terminal snapshot of one run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub success: bool,
    pub final_response: String,
    /// Number of LLM calls made
    pub iterations: u32,
    /// Number of function calls the model issued
    pub tool_calls: u32,
    /// Tool calls that ended in an error result
    pub tool_failures: u32,
    pub error: Option<RunError>,
    /// The full conversation, system prompt first
    pub messages: Vec<Message>,
}

impl RunResult {
    pub fn outcome(&self) -> RunOutcome {
        match (self.success, self.tool_failures) {
            (false, _) => RunOutcome::Aborted,
            (true, 0) => RunOutcome::Answered,
            (true, _) => RunOutcome::Recovered,
        }
    }
}

/// Callbacks for tool activity during a run.
pub trait RunObserver: Send + Sync {
    fn on_tool_start(&self, _call: &ToolCall) {}
    fn on_tool_progress(&self, _call: &ToolCall, _update: &ProgressUpdate) {}
    fn on_tool_complete(&self, _call: &ToolCall, _success: bool, _output: &str) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Routes a tool's progress reports to the run observer.
struct ObserverSink {
    observer: Arc<dyn RunObserver>,
    call: ToolCall,
}

impl ProgressSink for ObserverSink {
    fn report(&self, _call_id: &str, update: ProgressUpdate) {
        self.observer.on_tool_progress(&self.call, &update);
    }
}

/// Drives the LLM ⇄ tool loop.
#[derive(Clone)]
pub struct AgentRunner {
    client: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    model: String,
    system_prompt: String,
    max_iterations: u32,
    tool_timeout: Duration,
    llm_timeout: Duration,
    run_timeout: Duration,
    max_tool_output_chars: usize,
}

impl AgentRunner {
    /// Create a runner with the default agent settings.
    pub fn new(client: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>, model: impl Into<String>) -> Self {
        let defaults = AgentSettings::default();
        Self {
            client,
            tools,
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_iterations: defaults.max_iterations,
            tool_timeout: defaults.tool_timeout(),
            llm_timeout: defaults.llm_timeout(),
            run_timeout: defaults.run_timeout(),
            max_tool_output_chars: defaults.max_tool_output_chars,
        }
    }

    /// Create a runner from the `[agent]` settings of a loaded config.
    pub fn from_config(config: &AppConfig, client: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>) -> Self {
        let agent = &config.agent;
        let mut runner = Self::new(client, tools, config.model.clone())
            .with_max_iterations(agent.max_iterations)
            .with_tool_timeout(agent.tool_timeout())
            .with_llm_timeout(agent.llm_timeout())
            .with_run_timeout(agent.run_timeout())
            .with_max_tool_output_chars(agent.max_tool_output_chars);
        if let Some(prompt) = &agent.system_prompt {
            runner = runner.with_system_prompt(prompt.clone());
        }
        runner
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_max_tool_output_chars(mut self, max: usize) -> Self {
        self.max_tool_output_chars = max;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn client(&self) -> &Arc<dyn LlmClient> {
        &self.client
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run a single prompt with no prior conversation.
    pub async fn run(&self, cancel: &CancellationToken, prompt: &str) -> RunResult {
        self.run_with(cancel, &[], prompt, Arc::new(NoopObserver)).await
    }

    /// Run a prompt after earlier turns of the same conversation.
    pub async fn run_with(
        &self,
        cancel: &CancellationToken,
        history: &[Message],
        prompt: &str,
        observer: Arc<dyn RunObserver>,
    ) -> RunResult {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(history.iter().filter(|m| m.role != Role::System).cloned());
        messages.push(Message::user(prompt));

        let mut state = RunState {
            messages,
            iterations: 0,
            tool_calls: 0,
            tool_failures: 0,
        };

        info!(model = %self.model, backend = self.client.name(), "Starting agent run");
        let result = match self.drive(cancel, &mut state, &observer).await {
            Ok(answer) => state.finish(Ok(answer)),
            Err(err) => state.finish(Err(err)),
        };
        info!(
            outcome = result.outcome().as_str(),
            iterations = result.iterations,
            tool_calls = result.tool_calls,
            "Agent run finished"
        );
        result
    }

    async fn drive(
        &self,
        cancel: &CancellationToken,
        state: &mut RunState,
        observer: &Arc<dyn RunObserver>,
    ) -> Result<String, RunError> {
        let deadline = Instant::now() + self.run_timeout;
        let renderer = PromptRenderer::new(self.client.supports_native_function_calling());
        let definitions = self.tools.definitions();

        while state.iterations < self.max_iterations {
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            state.iterations += 1;
            debug!(iteration = state.iterations, "Agent loop iteration");

            let request = LlmRequest::new(self.model.clone(), renderer.render(&state.messages))
                .with_system_prompt(self.system_prompt.clone())
                .with_tools(definitions.clone());
            let response = self.call_llm(cancel, &request, deadline).await?;

            let call = match response {
                FunctionCallResponse::Text(answer) => {
                    state.messages.push(Message::assistant(&answer));
                    return Ok(answer);
                }
                FunctionCallResponse::FunctionCall(call) => call,
            };

            state.tool_calls += 1;
            state.messages.push(Message::assistant_call(call.clone()));
            observer.on_tool_start(&call);

            let result = self.execute_tool(cancel, &call, deadline, observer).await;
            let (success, raw) = match result {
                Ok(result) => (result.success, result.to_text()),
                Err(err) => {
                    warn!(tool = %call.name, call_id = %call.id, error = %err, "Tool call failed");
                    (false, ToolResult::from(err).to_text())
                }
            };
            if !success {
                state.tool_failures += 1;
            }

            let output = sanitize_output(&raw, self.max_tool_output_chars);
            observer.on_tool_complete(&call, success, &output);
            state
                .messages
                .push(Message::tool_result(&call.id, &call.name, output));

            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }
        }

        warn!(limit = self.max_iterations, "Iteration limit reached");
        Err(RunError::IterationLimit {
            limit: self.max_iterations,
        })
    }

    /// One LLM call bounded by its own timeout and the run deadline.
    async fn call_llm(
        &self,
        cancel: &CancellationToken,
        request: &LlmRequest,
        deadline: Instant,
    ) -> Result<FunctionCallResponse, RunError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(RunError::RunTimeout {
                timeout_secs: self.run_timeout.as_secs(),
            });
        }
        let (budget, run_bound) = if remaining < self.llm_timeout {
            (remaining, true)
        } else {
            (self.llm_timeout, false)
        };

        let call_cancel = cancel.child_token();
        let outcome = tokio::time::timeout(
            budget,
            self.client.generate_with_functions(&call_cancel, request),
        )
        .await;

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) if cancel.is_cancelled() => Err(RunError::Cancelled),
            Ok(Err(err)) => {
                warn!(error = %err, "LLM call failed, aborting run");
                Err(RunError::Transport(err))
            }
            Err(_) => {
                call_cancel.cancel();
                if run_bound {
                    Err(RunError::RunTimeout {
                        timeout_secs: self.run_timeout.as_secs(),
                    })
                } else {
                    warn!(timeout_secs = budget.as_secs(), "LLM call timed out");
                    Err(RunError::LlmTimeout {
                        timeout_secs: budget.as_secs(),
                    })
                }
            }
        }
    }

    /// Execute one tool call with its own cancellation token and timeout.
    async fn execute_tool(
        &self,
        cancel: &CancellationToken,
        call: &ToolCall,
        deadline: Instant,
        observer: &Arc<dyn RunObserver>,
    ) -> Result<ToolResult, ToolError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let budget = self.tool_timeout.min(remaining);

        let tool_cancel = cancel.child_token();
        let sink = Arc::new(ObserverSink {
            observer: observer.clone(),
            call: call.clone(),
        });
        let ctx = ToolContext::new(call.id.clone(), tool_cancel.clone()).with_progress(sink);

        debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        match tokio::time::timeout(budget, self.tools.execute(&ctx, call)).await {
            Ok(result) => result,
            Err(_) => {
                tool_cancel.cancel();
                Err(ToolError::Timeout {
                    tool_name: call.name.clone(),
                    timeout_secs: budget.as_secs(),
                })
            }
        }
    }
}

struct RunState {
    messages: Vec<Message>,
    iterations: u32,
    tool_calls: u32,
    tool_failures: u32,
}

impl RunState {
    fn finish(self, outcome: Result<String, RunError>) -> RunResult {
        let (success, final_response, error) = match outcome {
            Ok(answer) => (true, answer, None),
            Err(err) => (false, String::new(), Some(err)),
        };
        RunResult {
            success,
            final_response,
            iterations: self.iterations,
            tool_calls: self.tool_calls,
            tool_failures: self.tool_failures,
            error,
            messages: self.messages,
        }
    }
}
