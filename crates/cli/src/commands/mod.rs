//! Subcommand implementations and the wiring they share.

pub mod chat;
pub mod config_cmd;
pub mod plan;
pub mod providers;
pub mod sessions;

use std::path::PathBuf;
use std::sync::Arc;

use ferrocode_agent::AgentRunner;
use ferrocode_config::AppConfig;
use ferrocode_core::history::HistoryStore;
use ferrocode_core::provider::LlmClient;
use ferrocode_core::tool::ToolRegistry;
use ferrocode_history::JsonFileHistory;
use ferrocode_security::SafeFileOps;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Flags accepted by every subcommand.
pub struct GlobalOpts {
    pub config: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
}

impl GlobalOpts {
    /// Load the config file, apply env overrides and the `--workspace` flag.
    pub fn load_config(&self) -> Result<AppConfig, Box<dyn std::error::Error>> {
        let mut config = AppConfig::load_with(self.config.as_deref())
            .map_err(|e| format!("Failed to load config: {e}"))?;
        if let Some(workspace) = &self.workspace {
            config.workspace_root = Some(workspace.clone());
        }
        Ok(config)
    }
}

/// Everything a run needs, built once from the config.
pub struct Runtime {
    pub config: AppConfig,
    pub client: Arc<dyn LlmClient>,
    pub ops: Arc<SafeFileOps>,
    pub tools: Arc<ToolRegistry>,
}

impl Runtime {
    /// Configuration problems surface here, before any request is made.
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let ops = SafeFileOps::new(config.sandbox_roots())
            .map_err(|e| format!("Invalid workspace: {e}"))?;
        let ops = Arc::new(ops);
        let client = ferrocode_providers::build_client(&config)?;
        let tools = ferrocode_tools::default_registry(&config, ops.clone())?;
        debug!(tools = ?tools.names(), root = %ops.primary_root().display(), "Runtime ready");
        Ok(Self {
            config,
            client,
            ops,
            tools: Arc::new(tools),
        })
    }

    pub fn runner(&self) -> AgentRunner {
        AgentRunner::from_config(&self.config, self.client.clone(), self.tools.clone())
    }

    pub fn history(&self) -> Option<Arc<dyn HistoryStore>> {
        history_store(&self.config)
    }
}

pub fn history_store(config: &AppConfig) -> Option<Arc<dyn HistoryStore>> {
    config
        .history
        .enabled
        .then(|| Arc::new(JsonFileHistory::new(config.history_dir())) as Arc<dyn HistoryStore>)
}

/// A token cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\n  Cancelling...");
                trigger.cancel();
            }
            Err(e) => warn!(error = %e, "Could not install Ctrl-C handler"),
        }
    });
    cancel
}
