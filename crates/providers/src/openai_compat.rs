//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Groq, DeepSeek, Together AI, vLLM,
//! llama.cpp server, and any endpoint exposing `/chat/completions`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Native tool calling (`tools[]` + `tool_choice`) when enabled
//! - Text-mode function calling otherwise

use async_trait::async_trait;
use futures::StreamExt;
use ferrocode_core::error::ProviderError;
use ferrocode_core::message::ToolCall;
use ferrocode_core::provider::{FunctionCallResponse, LlmClient, LlmRequest, ToolDefinition};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::framing::{LineBuffer, SseLine, parse_sse_line};
use crate::function_call;
use crate::http::{build_http_client, cancellable, check_status, map_request_error, read_json};

/// An OpenAI-compatible chat-completions client.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: Option<String>,
    native_tools: bool,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new OpenAI-compatible client.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            native_tools: true,
            temperature: 0.2,
            client: build_http_client()?,
        })
    }

    /// Create an OpenAI client (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openai", "https://api.openai.com/v1", Some(api_key.into()))
    }

    /// Toggle native tool calling. When off, tools are described in the
    /// system prompt and the reply text is parsed instead.
    pub fn with_native_tools(mut self, native_tools: bool) -> Self {
        self.native_tools = native_tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn to_api_messages(system: &str, prompt: &str) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ApiMessage {
                role: "system".into(),
                content: Some(system.to_string()),
                tool_calls: None,
            });
        }
        messages.push(ApiMessage {
            role: "user".into(),
            content: Some(prompt.to_string()),
            tool_calls: None,
        });
        messages
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn body(
        &self,
        request: &LlmRequest,
        system: &str,
        tools: &[ToolDefinition],
        stream: bool,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(system, &request.prompt),
            "temperature": self.temperature,
            "stream": stream,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(tools));
            body["tool_choice"] = serde_json::json!("auto");
        }
        body
    }

    async fn post(
        &self,
        cancel: &CancellationToken,
        body: &serde_json::Value,
        streaming: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(provider = %self.name, model = %body["model"], streaming, "Sending completion request");

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        if streaming {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = cancellable(cancel, async move {
            builder.send().await.map_err(|e| map_request_error(&url, e))
        })
        .await?;
        check_status(&self.name, response).await
    }

    async fn complete(
        &self,
        cancel: &CancellationToken,
        body: &serde_json::Value,
    ) -> Result<ApiMessage, ProviderError> {
        let response = self.post(cancel, body, false).await?;
        let api_response: ApiResponse = cancellable(cancel, read_json(response)).await?;
        api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ProviderError::MalformedResponse("No choices in response".into()))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        cancel: &CancellationToken,
        request: &LlmRequest,
    ) -> Result<String, ProviderError> {
        let body = self.body(request, &request.system_prompt, &[], false);
        let message = self.complete(cancel, &body).await?;
        Ok(message.content.unwrap_or_default())
    }

    async fn generate_with_functions(
        &self,
        cancel: &CancellationToken,
        request: &LlmRequest,
    ) -> Result<FunctionCallResponse, ProviderError> {
        if !self.native_tools {
            let system = function_call::system_prompt_with_tools(&request.system_prompt, &request.tools);
            let body = self.body(request, &system, &[], false);
            let text = self.complete(cancel, &body).await?.content.unwrap_or_default();
            if request.tools.is_empty() {
                return Ok(FunctionCallResponse::Text(text));
            }
            return Ok(function_call::parse_response(&text));
        }

        let body = self.body(request, &request.system_prompt, &request.tools, false);
        let message = self.complete(cancel, &body).await?;
        let mut calls = message.tool_calls.unwrap_or_default();

        if calls.is_empty() {
            return Ok(FunctionCallResponse::Text(message.content.unwrap_or_default()));
        }
        if calls.len() > 1 {
            warn!(
                provider = %self.name,
                count = calls.len(),
                "Model requested several tool calls; executing the first only"
            );
        }

        let call = calls.swap_remove(0);
        if call.function.name.trim().is_empty() {
            return Err(ProviderError::MalformedResponse("tool call without a name".into()));
        }
        let mut tool_call = ToolCall::new(call.function.name, call.function.arguments);
        if !call.id.is_empty() {
            tool_call.id = call.id;
        }
        Ok(FunctionCallResponse::FunctionCall(tool_call))
    }

    async fn stream(
        &self,
        cancel: &CancellationToken,
        request: &LlmRequest,
        out: mpsc::Sender<String>,
    ) -> Result<(), ProviderError> {
        let body = self.body(request, &request.system_prompt, &[], true);
        let response = self.post(cancel, &body, true).await?;

        let mut byte_stream = response.bytes_stream();
        let mut buffer = LineBuffer::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                chunk = byte_stream.next() => chunk,
            };

            let Some(chunk) = chunk else {
                return Err(ProviderError::StreamInterrupted(
                    "stream ended without [DONE]".into(),
                ));
            };
            let bytes = chunk.map_err(|e| ProviderError::StreamInterrupted(e.to_string()))?;
            buffer.push(&bytes);

            while let Some(line) = buffer.next_line() {
                let data = match parse_sse_line(&line) {
                    SseLine::Done => return Ok(()),
                    SseLine::Ignore => continue,
                    SseLine::Data(data) => data,
                };

                let stream_resp: StreamResponse = match serde_json::from_str(data) {
                    Ok(r) => r,
                    Err(e) => {
                        trace!(provider = %self.name, data = %data, error = %e, "Ignoring unparseable SSE chunk");
                        continue;
                    }
                };

                let Some(content) = stream_resp
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .filter(|c| !c.is_empty())
                else {
                    continue;
                };

                let delivered = cancellable(cancel, async { Ok(out.send(content).await.is_ok()) }).await?;
                if !delivered {
                    return Ok(()); // receiver dropped
                }
            }
        }
    }

    fn supports_native_function_calling(&self) -> bool {
        self.native_tools
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server;

    fn shell_tool() -> ToolDefinition {
        ToolDefinition {
            name: "run_command".into(),
            description: "Run a shell command".into(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    fn request() -> LlmRequest {
        LlmRequest::new("gpt-4o-mini", "List the tests").with_system_prompt("You are helpful")
    }

    fn completion(message: serde_json::Value) -> String {
        serde_json::json!({"model": "gpt-4o-mini", "choices": [{"message": message}]}).to_string()
    }

    #[test]
    fn openai_constructor() {
        let client = OpenAiCompatClient::openai("sk-test").unwrap();
        assert_eq!(client.name(), "openai");
        assert!(client.base_url.contains("api.openai.com"));
        assert!(client.supports_native_function_calling());
    }

    #[test]
    fn message_conversion() {
        let api_messages = OpenAiCompatClient::to_api_messages("You are helpful", "Hello");
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
        assert_eq!(OpenAiCompatClient::to_api_messages("", "Hello").len(), 1);
    }

    #[test]
    fn tool_definition_conversion() {
        let api_tools = OpenAiCompatClient::to_api_tools(&[shell_tool()]);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "run_command");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn parse_stream_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn native_tool_call_is_mapped_directly() {
        let reply = completion(serde_json::json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_abc",
                "type": "function",
                "function": {"name": "run_command", "arguments": "{\"command\":\"cargo test\"}"}
            }]
        }));
        let (url, server) = test_server::serve(200, "application/json", vec![reply]).await;
        let client = OpenAiCompatClient::new("openai", url, Some("sk-test".into())).unwrap();

        let req = request().with_tools(vec![shell_tool()]);
        let response = client
            .generate_with_functions(&CancellationToken::new(), &req)
            .await
            .unwrap();
        match response {
            FunctionCallResponse::FunctionCall(call) => {
                assert_eq!(call.id, "call_abc");
                assert_eq!(call.name, "run_command");
                assert_eq!(call.arguments, "{\"command\":\"cargo test\"}");
            }
            other => panic!("Expected function call, got {other:?}"),
        }

        let captured = server.await.unwrap();
        assert!(captured.head.starts_with("POST /chat/completions"));
        assert!(captured.head.to_lowercase().contains("authorization: bearer sk-test"));
        let body = captured.json();
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "run_command");
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[tokio::test]
    async fn native_mode_text_reply_is_text() {
        let reply = completion(serde_json::json!({"role": "assistant", "content": "All 12 tests pass."}));
        let (url, _server) = test_server::serve(200, "application/json", vec![reply]).await;
        let client = OpenAiCompatClient::new("openai", url, None).unwrap();

        let req = request().with_tools(vec![shell_tool()]);
        let response = client
            .generate_with_functions(&CancellationToken::new(), &req)
            .await
            .unwrap();
        assert_eq!(response, FunctionCallResponse::Text("All 12 tests pass.".into()));
    }

    #[tokio::test]
    async fn text_mode_parses_embedded_call_and_sends_no_tools() {
        let reply = completion(serde_json::json!({
            "role": "assistant",
            "content": "I'll run them.\n{\"name\": \"run_command\", \"arguments\": {\"command\": \"go test ./...\"}}"
        }));
        let (url, server) = test_server::serve(200, "application/json", vec![reply]).await;
        let client = OpenAiCompatClient::new("vllm", url, None)
            .unwrap()
            .with_native_tools(false);
        assert!(!client.supports_native_function_calling());

        let req = request().with_tools(vec![shell_tool()]);
        let response = client
            .generate_with_functions(&CancellationToken::new(), &req)
            .await
            .unwrap();
        match response {
            FunctionCallResponse::FunctionCall(call) => {
                assert_eq!(call.name, "run_command");
                assert!(call.id.starts_with("call_"));
            }
            other => panic!("Expected function call, got {other:?}"),
        }

        let captured = server.await.unwrap();
        assert!(!captured.head.to_lowercase().contains("authorization"));
        let body = captured.json();
        assert!(body.get("tools").is_none());
        let system = body["messages"][0]["content"].as_str().unwrap();
        assert!(system.contains("- run_command: Run a shell command"));
    }

    #[tokio::test]
    async fn stream_parses_sse_and_stops_at_done() {
        let parts = vec![
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n".to_string(),
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choi".to_string(),
            "ces\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n: keep-alive\n\n".to_string(),
            "data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n".to_string(),
        ];
        let (url, server) = test_server::serve(200, "text/event-stream", parts).await;
        let client = OpenAiCompatClient::new("openai", url, Some("sk".into())).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        client.stream(&CancellationToken::new(), &request(), tx).await.unwrap();

        let mut deltas = Vec::new();
        while let Some(d) = rx.recv().await {
            deltas.push(d);
        }
        assert_eq!(deltas, vec!["Hel", "lo"]);
        assert_eq!(server.await.unwrap().json()["stream"], true);
    }

    #[tokio::test]
    async fn cancelled_stream_closes_the_channel() {
        let (url, _server) = test_server::hang().await;
        let client = OpenAiCompatClient::new("openai", url, None).unwrap();
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = client.stream(&cancel, &request(), tx).await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancellation_reaches_a_stream_blocked_on_a_full_channel() {
        let parts = vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"one\"}}]}\n\n".to_string(),
            "data: {\"choices\":[{\"delta\":{\"content\":\"two\"}}]}\n\n".to_string(),
            "data: [DONE]\n\n".to_string(),
        ];
        let (url, _server) = test_server::serve(200, "text/event-stream", parts).await;
        let client = OpenAiCompatClient::new("openai", url, None).unwrap();
        let cancel = CancellationToken::new();
        // Capacity 1 and nobody reading: the second delta cannot be delivered.
        let (tx, _rx) = mpsc::channel(1);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            client.stream(&cancel, &request(), tx),
        )
        .await
        .expect("stream ignored cancellation");
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }

    #[tokio::test]
    async fn status_codes_map_to_errors() {
        let (url, _server) = test_server::serve(401, "application/json", vec!["{}".into()]).await;
        let client = OpenAiCompatClient::new("openai", url, Some("bad".into())).unwrap();
        let err = client.generate(&CancellationToken::new(), &request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));

        let (url, _server) = test_server::serve(429, "application/json", vec!["{}".into()]).await;
        let client = OpenAiCompatClient::new("openai", url, Some("k".into())).unwrap();
        let err = client.generate(&CancellationToken::new(), &request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_transport_error() {
        let (url, _server) = test_server::serve(200, "application/json", vec!["{\"choices\": [".into()]).await;
        let client = OpenAiCompatClient::new("openai", url, None).unwrap();
        let err = client.generate(&CancellationToken::new(), &request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }
}
