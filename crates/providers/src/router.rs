//! Provider router — selects the LLM client based on config.
//!
//! One concrete client is chosen per process at construction time; the
//! rest of the system only ever sees `Arc<dyn LlmClient>`.

use std::sync::Arc;

use ferrocode_config::AppConfig;
use ferrocode_core::error::ProviderError;
use ferrocode_core::provider::LlmClient;
use tracing::info;

use crate::ollama::OllamaClient;
use crate::openai_compat::OpenAiCompatClient;

/// Known provider names, for help text and error messages.
pub const KNOWN_PROVIDERS: &[&str] = &[
    "ollama",
    "openai",
    "openrouter",
    "groq",
    "deepseek",
    "together",
    "vllm",
    "llamacpp",
    "custom",
];

/// Build the client for `config.provider`.
///
/// Unknown providers and missing credentials are configuration errors,
/// reported before any request is made.
pub fn build_client(config: &AppConfig) -> Result<Arc<dyn LlmClient>, ProviderError> {
    let name = config.provider.trim().to_lowercase();
    let base_url = config.resolved_base_url();
    let native_override = config.provider_config().and_then(|p| p.native_tools);

    if name == "ollama" {
        info!(provider = "ollama", model = %config.model, "LLM client selected");
        let client = OllamaClient::new(base_url.as_deref(), config.temperature)?;
        return Ok(Arc::new(client));
    }

    let spec = openai_compat_spec(&name).ok_or_else(|| {
        ProviderError::NotConfigured(format!(
            "unknown provider '{}' (expected one of: {})",
            config.provider,
            KNOWN_PROVIDERS.join(", ")
        ))
    })?;

    let base_url = match (base_url, spec.base_url) {
        (Some(url), _) => url,
        (None, Some(default)) => default.to_string(),
        (None, None) => {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{name}' requires base_url"
            )));
        }
    };

    let api_key = config.resolved_api_key();
    if spec.requires_key && api_key.is_none() {
        return Err(ProviderError::NotConfigured(format!(
            "provider '{name}' requires an API key (set FERROCODE_API_KEY or [providers.{name}] api_key)"
        )));
    }

    let native_tools = native_override.unwrap_or(spec.native_tools);
    info!(provider = %name, model = %config.model, base_url = %base_url, native_tools, "LLM client selected");

    let client = OpenAiCompatClient::new(name, base_url, api_key)?
        .with_native_tools(native_tools)
        .with_temperature(config.temperature);
    Ok(Arc::new(client))
}

struct OpenAiCompatSpec {
    base_url: Option<&'static str>,
    requires_key: bool,
    native_tools: bool,
}

/// Defaults for OpenAI-compatible providers.
fn openai_compat_spec(provider_name: &str) -> Option<OpenAiCompatSpec> {
    let (base_url, requires_key, native_tools) = match provider_name {
        "openai" => (Some("https://api.openai.com/v1"), true, true),
        "openrouter" => (Some("https://openrouter.ai/api/v1"), true, true),
        "groq" => (Some("https://api.groq.com/openai/v1"), true, true),
        "deepseek" => (Some("https://api.deepseek.com/v1"), true, true),
        "together" => (Some("https://api.together.xyz/v1"), true, true),
        "vllm" => (Some("http://localhost:8000/v1"), false, false),
        "llamacpp" | "llama.cpp" => (Some("http://localhost:8080/v1"), false, false),
        "custom" => (None, false, false),
        _ => return None,
    };
    Some(OpenAiCompatSpec {
        base_url,
        requires_key,
        native_tools,
    })
}
