//! Ollama provider implementation.
//!
//! Talks to the native `POST /api/generate` endpoint. Ollama's generate
//! API has no structured tool-call field, so function calling runs in text
//! mode: the tool catalogue is appended to the system prompt and the reply
//! is scanned for a call object.

use async_trait::async_trait;
use futures::StreamExt;
use ferrocode_core::error::ProviderError;
use ferrocode_core::provider::{FunctionCallResponse, LlmClient, LlmRequest};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::framing::LineBuffer;
use crate::function_call;
use crate::http::{build_http_client, cancellable, check_status, map_request_error, read_json};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// A client for a local or remote Ollama server.
pub struct OllamaClient {
    base_url: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: Option<&str>, temperature: f32) -> Result<Self, ProviderError> {
        let base_url = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        // Accept the OpenAI-compatible URL form as well.
        let base_url = base_url.strip_suffix("/v1").unwrap_or(base_url).to_string();
        Ok(Self {
            base_url,
            temperature,
            client: build_http_client()?,
        })
    }

    fn body<'a>(&self, request: &'a LlmRequest, system: &'a str, stream: bool) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            system: (!system.is_empty()).then_some(system),
            stream,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        }
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        body: &GenerateRequest<'_>,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(provider = "ollama", model = %body.model, stream = body.stream, "Sending generate request");

        let response = cancellable(cancel, async {
            self.client
                .post(&url)
                .json(body)
                .send()
                .await
                .map_err(|e| map_request_error(&url, e))
        })
        .await?;
        check_status("ollama", response).await
    }

    async fn complete(
        &self,
        cancel: &CancellationToken,
        request: &LlmRequest,
        system: &str,
    ) -> Result<String, ProviderError> {
        let body = self.body(request, system, false);
        let response = self.send(cancel, &body).await?;
        let reply: GenerateResponse = cancellable(cancel, read_json(response)).await?;
        if let Some(error) = reply.error {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: error,
            });
        }
        reply
            .response
            .ok_or_else(|| ProviderError::MalformedResponse("missing 'response' field".into()))
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        cancel: &CancellationToken,
        request: &LlmRequest,
    ) -> Result<String, ProviderError> {
        self.complete(cancel, request, &request.system_prompt).await
    }

    async fn generate_with_functions(
        &self,
        cancel: &CancellationToken,
        request: &LlmRequest,
    ) -> Result<FunctionCallResponse, ProviderError> {
        let system = function_call::system_prompt_with_tools(&request.system_prompt, &request.tools);
        let text = self.complete(cancel, request, &system).await?;
        if request.tools.is_empty() {
            return Ok(FunctionCallResponse::Text(text));
        }
        Ok(function_call::parse_response(&text))
    }

    async fn stream(
        &self,
        cancel: &CancellationToken,
        request: &LlmRequest,
        out: mpsc::Sender<String>,
    ) -> Result<(), ProviderError> {
        let body = self.body(request, &request.system_prompt, true);
        let response = self.send(cancel, &body).await?;

        let mut byte_stream = response.bytes_stream();
        let mut buffer = LineBuffer::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                chunk = byte_stream.next() => chunk,
            };

            let Some(chunk) = chunk else {
                // A final line may arrive without a trailing newline.
                if let Some(line) = buffer.finish()
                    && handle_line(cancel, &line, &out).await? == LineOutcome::Finished
                {
                    return Ok(());
                }
                return Err(ProviderError::StreamInterrupted(
                    "stream ended before the final chunk".into(),
                ));
            };
            let bytes = chunk.map_err(|e| ProviderError::StreamInterrupted(e.to_string()))?;
            buffer.push(&bytes);

            while let Some(line) = buffer.next_line() {
                if handle_line(cancel, &line, &out).await? == LineOutcome::Finished {
                    return Ok(());
                }
            }
        }
    }

    fn supports_native_function_calling(&self) -> bool {
        false
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    Continue,
    Finished,
}

/// Forward one NDJSON line. A dropped receiver ends the stream quietly.
async fn handle_line(
    cancel: &CancellationToken,
    line: &str,
    out: &mpsc::Sender<String>,
) -> Result<LineOutcome, ProviderError> {
    if line.trim().is_empty() {
        return Ok(LineOutcome::Continue);
    }
    let chunk: GenerateResponse = match serde_json::from_str(line) {
        Ok(c) => c,
        Err(e) => {
            trace!(provider = "ollama", data = %line, error = %e, "Ignoring unparseable stream line");
            return Ok(LineOutcome::Continue);
        }
    };
    if let Some(error) = chunk.error {
        return Err(ProviderError::StreamInterrupted(error));
    }
    if let Some(delta) = chunk.response
        && !delta.is_empty()
    {
        let delivered = cancellable(cancel, async { Ok(out.send(delta).await.is_ok()) }).await?;
        if !delivered {
            return Ok(LineOutcome::Finished);
        }
    }
    Ok(if chunk.done {
        LineOutcome::Finished
    } else {
        LineOutcome::Continue
    })
}

// --- Ollama API types (internal) ---

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}
