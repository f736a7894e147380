//! Configuration loading, validation, and management for ferrocode.
//!
//! Loads configuration from `~/.ferrocode/config.toml` with environment
//! variable overrides. Validates all settings at startup. The resulting
//! [`AppConfig`] is an immutable value handed to each component's
//! constructor; nothing reads it from a global.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.ferrocode/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// LLM provider name (ollama, openai, openrouter, ...)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier passed to the provider
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL override for the selected provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Primary sandbox root. Defaults to the current directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Additional directories tools may access
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_roots: Vec<PathBuf>,

    /// Agent loop bounds
    #[serde(default)]
    pub agent: AgentSettings,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Event bridge settings
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// `run_command` tool settings
    #[serde(default)]
    pub shell: ShellConfig,

    /// Session history settings
    #[serde(default)]
    pub history: HistoryConfig,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "qwen2.5-coder:7b".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("workspace_root", &self.workspace_root)
            .field("extra_roots", &self.extra_roots)
            .field("agent", &self.agent)
            .field("providers", &self.providers)
            .field("bridge", &self.bridge)
            .field("shell", &self.shell)
            .field("history", &self.history)
            .finish()
    }
}

/// Bounds on a single agent run. Each limit is independent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum number of LLM calls per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Timeout for one tool execution
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Timeout for one LLM round trip
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Wall-clock limit for a whole run
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// Tool output longer than this is truncated before the model sees it
    #[serde(default = "default_max_tool_output_chars")]
    pub max_tool_output_chars: usize,

    /// Replaces the built-in system prompt when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_iterations() -> u32 {
    8
}
fn default_tool_timeout_secs() -> u64 {
    30
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_run_timeout_secs() -> u64 {
    600
}
fn default_max_tool_output_chars() -> usize {
    16_000
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
            llm_timeout_secs: default_llm_timeout_secs(),
            run_timeout_secs: default_run_timeout_secs(),
            max_tool_output_chars: default_max_tool_output_chars(),
            system_prompt: None,
        }
    }
}

impl AgentSettings {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Whether to use the provider's native tool-calling API.
    /// Unset means "use the provider's default".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_tools: Option<bool>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("native_tools", &self.native_tools)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Capacity of the event queue; events beyond it are dropped
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_buffer_size() -> usize {
    64
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base commands `run_command` may start. Empty allows any command.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
}

fn default_allowed_commands() -> Vec<String> {
    [
        "ls", "cat", "head", "tail", "wc", "grep", "rg", "find", "git", "cargo", "go", "make",
        "npm", "python3", "pytest",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_commands: default_allowed_commands(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for session files. Defaults to `~/.ferrocode/sessions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ferrocode/config.toml),
    /// then apply environment overrides:
    /// - `FERROCODE_PROVIDER`, `FERROCODE_MODEL`, `FERROCODE_WORKSPACE`
    /// - `FERROCODE_API_KEY`, then `OPENAI_API_KEY` when no key is configured
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load from `path` if given, otherwise the default location.
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(path.unwrap_or(&default_path))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = lookup("FERROCODE_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = lookup("FERROCODE_MODEL") {
            self.model = model;
        }
        if let Some(workspace) = lookup("FERROCODE_WORKSPACE") {
            self.workspace_root = Some(PathBuf::from(workspace));
        }
        if let Some(key) = lookup("FERROCODE_API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() {
            self.api_key = lookup("OPENAI_API_KEY");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ferrocode")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.trim().is_empty() {
            return Err(ConfigError::ValidationError("provider must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let agent = &self.agent;
        if agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }
        for (name, secs) in [
            ("agent.tool_timeout_secs", agent.tool_timeout_secs),
            ("agent.llm_timeout_secs", agent.llm_timeout_secs),
            ("agent.run_timeout_secs", agent.run_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::ValidationError(format!("{name} must be > 0")));
            }
        }
        if agent.max_tool_output_chars == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_output_chars must be > 0".into(),
            ));
        }
        if self.bridge.buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "bridge.buffer_size must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Settings for the selected provider, if a `[providers.<name>]` table exists.
    pub fn provider_config(&self) -> Option<&ProviderConfig> {
        self.providers.get(&self.provider)
    }

    /// The API key for the selected provider: per-provider key first.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.provider_config()
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// The base URL override for the selected provider, if any.
    pub fn resolved_base_url(&self) -> Option<String> {
        self.provider_config()
            .and_then(|p| p.base_url.clone())
            .or_else(|| self.base_url.clone())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.resolved_api_key().is_some()
    }

    /// The primary sandbox root.
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// All sandbox roots, primary first.
    pub fn sandbox_roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![self.workspace_root()];
        roots.extend(self.extra_roots.iter().cloned());
        roots
    }

    /// Where session files are stored.
    pub fn history_dir(&self) -> PathBuf {
        self.history
            .dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("sessions"))
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            workspace_root: None,
            extra_roots: Vec::new(),
            agent: AgentSettings::default(),
            providers: HashMap::new(),
            bridge: BridgeConfig::default(),
            shell: ShellConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.agent.max_iterations, 8);
        assert_eq!(config.bridge.buffer_size, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider, config.provider);
        assert_eq!(parsed.agent.tool_timeout_secs, config.agent.tool_timeout_secs);
    }

    #[test]
    fn zero_bounds_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.tool_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tool_timeout_secs"));

        let mut config = AppConfig::default();
        config.bridge.buffer_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        let config = result.unwrap();
        assert_eq!(config.provider, "ollama");
    }

    #[test]
    fn load_from_file_with_partial_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
provider = "openai"
model = "gpt-4o-mini"

[agent]
max_iterations = 3
tool_timeout_secs = 5

[providers.openai]
api_key = "sk-file"
native_tools = false
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.agent.max_iterations, 3);
        assert_eq!(config.agent.llm_timeout_secs, 120);
        assert_eq!(config.resolved_api_key().as_deref(), Some("sk-file"));
        assert_eq!(config.provider_config().unwrap().native_tools, Some(false));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "provider = [unterminated").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path).unwrap_err(),
            ConfigError::ParseError { .. }
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_env(|key| match key {
            "FERROCODE_PROVIDER" => Some("groq".into()),
            "FERROCODE_MODEL" => Some("llama-3.3-70b".into()),
            "FERROCODE_WORKSPACE" => Some("/srv/project".into()),
            "OPENAI_API_KEY" => Some("sk-env".into()),
            _ => None,
        });
        assert_eq!(config.provider, "groq");
        assert_eq!(config.model, "llama-3.3-70b");
        assert_eq!(config.workspace_root(), PathBuf::from("/srv/project"));
        assert_eq!(config.api_key.as_deref(), Some("sk-env"));
    }

    #[test]
    fn openai_key_does_not_override_configured_key() {
        let mut config = AppConfig {
            api_key: Some("sk-config".into()),
            ..AppConfig::default()
        };
        config.apply_env(|key| (key == "OPENAI_API_KEY").then(|| "sk-env".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("sk-config"));
    }

    #[test]
    fn debug_redacts_keys() {
        let mut config = AppConfig {
            api_key: Some("sk-very-secret".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("sk-also-secret".into()),
                ..ProviderConfig::default()
            },
        );
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn sandbox_roots_put_workspace_first() {
        let config = AppConfig {
            workspace_root: Some("/work".into()),
            extra_roots: vec!["/shared/docs".into()],
            ..AppConfig::default()
        };
        assert_eq!(
            config.sandbox_roots(),
            vec![PathBuf::from("/work"), PathBuf::from("/shared/docs")]
        );
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("provider"));
        assert!(toml_str.contains("[agent]"));
        assert!(toml_str.contains("max_iterations = 8"));
    }
}
