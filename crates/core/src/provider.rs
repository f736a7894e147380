//! LLM client trait — the abstraction over model backends.
//!
//! Providers disagree on how a function call is signalled. Some return a
//! structured tool-call field, others only return text that may contain a
//! JSON call object. Every backend implements [`LlmClient`] and hides that
//! difference behind [`FunctionCallResponse`], so the agent loop never needs
//! to know which backend it is talking to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::message::ToolCall;

/// A single request to an LLM backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The model to use (e.g., "qwen2.5-coder:7b", "gpt-4o")
    pub model: String,

    /// The rendered conversation
    pub prompt: String,

    /// System instructions
    #[serde(default)]
    pub system_prompt: String,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// What the model decided to do with a function-enabled request.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionCallResponse {
    /// A final free-text answer.
    Text(String),
    /// A request to run a tool.
    FunctionCall(ToolCall),
}

impl FunctionCallResponse {
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

/// The core LLM client trait.
///
/// Every method takes the caller's cancellation token. Cancelling it makes
/// the in-flight call return [`ProviderError::Cancelled`]; for `stream` the
/// sender is dropped, which closes the consumer's channel.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// A human-readable name for this backend (e.g., "ollama", "openai").
    fn name(&self) -> &str;

    /// Single-shot completion. Tools are ignored and no function-call
    /// parsing takes place.
    async fn generate(
        &self,
        cancel: &CancellationToken,
        request: &LlmRequest,
    ) -> Result<String, ProviderError>;

    /// Completion that may resolve to a tool call.
    async fn generate_with_functions(
        &self,
        cancel: &CancellationToken,
        request: &LlmRequest,
    ) -> Result<FunctionCallResponse, ProviderError>;

    /// Stream incremental text deltas into `out`.
    ///
    /// Returns once the provider's termination sentinel is seen. The sender
    /// is consumed so the receiver observes closure when this returns.
    async fn stream(
        &self,
        cancel: &CancellationToken,
        request: &LlmRequest,
        out: mpsc::Sender<String>,
    ) -> Result<(), ProviderError>;

    /// Whether the backend reports tool calls in a structured field.
    fn supports_native_function_calling(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder() {
        let req = LlmRequest::new("gpt-4o", "hello")
            .with_system_prompt("be brief")
            .with_tools(vec![ToolDefinition {
                name: "read_file".into(),
                description: "Read a file".into(),
                parameters: serde_json::json!({"type": "object"}),
            }]);
        assert_eq!(req.model, "gpt-4o");
        assert_eq!(req.system_prompt, "be brief");
        assert_eq!(req.tools.len(), 1);
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "run_command".into(),
            description: "Execute a shell command".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "The command to run" }
                },
                "required": ["command"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("run_command"));
        assert!(json.contains("command"));
    }

    #[test]
    fn function_call_response_kind() {
        assert!(FunctionCallResponse::Text("done".into()).is_text());
        assert!(!FunctionCallResponse::FunctionCall(ToolCall::new("echo", "{}")).is_text());
    }
}
