//! Built-in tool implementations for ferrocode.
//!
//! Tools give the agent the ability to work on a codebase: read and write
//! files, list directories, search code, and run commands. Every
//! filesystem tool goes through the shared `SafeFileOps` sandbox.

mod args;
pub mod list_directory;
pub mod read_file;
pub mod run_command;
pub mod search_code;
pub mod write_file;

use std::ffi::OsStr;
use std::sync::Arc;

use ferrocode_config::AppConfig;
use ferrocode_core::error::ToolError;
use ferrocode_core::tool::ToolRegistry;
use ferrocode_security::SafeFileOps;

pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use run_command::RunCommandTool;
pub use search_code::SearchCodeTool;
pub use write_file::WriteFileTool;

/// Directories that walking tools never descend into.
pub(crate) fn is_ignored_dir(name: &OsStr) -> bool {
    matches!(
        name.to_str(),
        Some(".git" | ".hg" | ".svn" | "target" | "node_modules")
    )
}

/// Create the default tool registry.
///
/// `run_command` is only registered when `[shell] enabled` is true, and is
/// restricted to the configured allowlist.
pub fn default_registry(config: &AppConfig, ops: Arc<SafeFileOps>) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ReadFileTool::new(ops.clone())))?;
    registry.register(Arc::new(WriteFileTool::new(ops.clone())))?;
    registry.register(Arc::new(ListDirectoryTool::new(ops.clone())))?;
    registry.register(Arc::new(SearchCodeTool::new(ops.clone())))?;
    if config.shell.enabled {
        registry.register(Arc::new(RunCommandTool::new(
            config.shell.allowed_commands.clone(),
            ops.primary_root().to_path_buf(),
        )))?;
    }
    tracing::debug!(tools = ?registry.names(), "Tool registry built");
    Ok(registry)
}
