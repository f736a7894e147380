//! `ferrocode providers` — List supported LLM providers.

use ferrocode_providers::router::KNOWN_PROVIDERS;

use super::CmdResult;

/// (name, default endpoint, auth, tool calling)
const PROVIDER_TABLE: &[(&str, &str, &str, &str)] = &[
    ("ollama", "localhost:11434", "none", "text"),
    ("openai", "api.openai.com/v1", "API key", "native"),
    ("openrouter", "openrouter.ai/api/v1", "API key", "native"),
    ("groq", "api.groq.com/openai/v1", "API key", "native"),
    ("deepseek", "api.deepseek.com/v1", "API key", "native"),
    ("together", "api.together.xyz/v1", "API key", "native"),
    ("vllm", "localhost:8000/v1", "none", "text"),
    ("llamacpp", "localhost:8080/v1", "none", "text"),
    ("custom", "base_url required", "optional", "text"),
];

pub fn run() -> CmdResult {
    println!("Supported LLM providers");
    println!();
    println!("  {:<12} {:<26} {:<10} tools", "provider", "endpoint", "auth");
    for (name, endpoint, auth, tools) in PROVIDER_TABLE {
        println!("  {name:<12} {endpoint:<26} {auth:<10} {tools}");
    }
    println!();
    println!("  Select one with `provider = \"...\"` in config.toml or FERROCODE_PROVIDER.");
    println!("  Override the tool-calling mode with [providers.<name>] native_tools = true|false.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_every_known_provider() {
        let names: Vec<_> = PROVIDER_TABLE.iter().map(|row| row.0).collect();
        assert_eq!(names, KNOWN_PROVIDERS);
    }
}
