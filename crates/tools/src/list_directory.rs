//! Directory listing tool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ferrocode_core::error::ToolError;
use ferrocode_core::tool::{Tool, ToolContext, ToolResult};
use ferrocode_security::{SafeFileOps, SandboxError};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::{args, is_ignored_dir};

const DEFAULT_MAX_ENTRIES: usize = 200;

pub struct ListDirectoryTool {
    ops: Arc<SafeFileOps>,
}

impl ListDirectoryTool {
    pub fn new(ops: Arc<SafeFileOps>) -> Self {
        Self { ops }
    }
}

/// Walk `root` depth-first. Runs on the blocking pool; stops early once
/// `cancel` fires. Returns the lines and whether the cap was hit.
fn walk(
    ops: &SafeFileOps,
    root: &Path,
    max_entries: usize,
    cancel: &CancellationToken,
) -> (Vec<String>, bool) {
    let mut lines = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && e.depth() > 0 && is_ignored_dir(e.file_name())));

    for entry in walker {
        if cancel.is_cancelled() {
            break;
        }
        let Ok(entry) = entry else { continue };
        if lines.len() >= max_entries {
            return (lines, true);
        }
        let shown = ops.display_path(entry.path());
        if entry.file_type().is_dir() {
            lines.push(format!("{shown}/"));
        } else {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            lines.push(format!("{shown} ({size} bytes)"));
        }
    }
    (lines, false)
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List files and directories in the workspace. Set recursive=true to walk subdirectories (.git, target and node_modules are skipped)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path relative to the workspace root (default: root)"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Walk subdirectories (default: false)"
                },
                "max_entries": {
                    "type": "integer",
                    "description": "Maximum number of entries to return (default: 200)"
                }
            }
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let path = args::optional_str(&arguments, "path")?.unwrap_or(".");
        let recursive = args::optional_bool(&arguments, "recursive")?.unwrap_or(false);
        let max_entries = args::optional_usize(&arguments, "max_entries")?
            .unwrap_or(DEFAULT_MAX_ENTRIES)
            .max(1);

        if !recursive {
            let entries = match self.ops.list_dir(path).await {
                Ok(entries) => entries,
                Err(e @ SandboxError::OutsideRoots { .. }) => return Err(e.into()),
                Err(e) => return Ok(ToolResult::failure(format!("Failed to list directory: {e}"))),
            };
            let truncated = entries.len() > max_entries;
            let mut lines: Vec<String> = entries
                .iter()
                .take(max_entries)
                .map(|e| {
                    if e.is_dir {
                        format!("{}/", e.name)
                    } else {
                        format!("{} ({} bytes)", e.name, e.size)
                    }
                })
                .collect();
            if truncated {
                lines.push(format!("... ({} more entries)", entries.len() - max_entries));
            }
            if lines.is_empty() {
                return Ok(ToolResult::text("(empty directory)"));
            }
            return Ok(ToolResult::text(lines.join("\n")));
        }

        let root: PathBuf = self.ops.validate_path(path)?;
        if !root.is_dir() {
            return Ok(ToolResult::failure(format!("Not a directory: {path}")));
        }

        let ops = self.ops.clone();
        let cancel = ctx.cancel_token().clone();
        let (mut lines, truncated) =
            tokio::task::spawn_blocking(move || walk(&ops, &root, max_entries, &cancel))
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "list_directory".into(),
                    reason: e.to_string(),
                })?;
        if ctx.is_cancelled() {
            return Err(ToolError::Cancelled("list_directory".into()));
        }
        if truncated {
            lines.push(format!("... (stopped after {max_entries} entries)"));
        }
        if lines.is_empty() {
            return Ok(ToolResult::text("(empty directory)"));
        }
        Ok(ToolResult::text(lines.join("\n")))
    }
}
