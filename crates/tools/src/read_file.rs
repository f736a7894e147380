//! File read tool — read file contents inside the sandbox.

use std::sync::Arc;

use async_trait::async_trait;
use ferrocode_core::error::ToolError;
use ferrocode_core::tool::{Tool, ToolContext, ToolResult};
use ferrocode_security::{SafeFileOps, SandboxError};
use tracing::debug;

use crate::args;

pub struct ReadFileTool {
    ops: Arc<SafeFileOps>,
}

impl ReadFileTool {
    pub fn new(ops: Arc<SafeFileOps>) -> Self {
        Self { ops }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file in the workspace. Use offset/limit to read a range of lines from large files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the workspace root"
                },
                "offset": {
                    "type": "integer",
                    "description": "First line to return (1-based, default 1)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let path = args::required_str(&arguments, "path")?;
        let offset = args::optional_usize(&arguments, "offset")?.unwrap_or(1).max(1);
        let limit = args::optional_usize(&arguments, "limit")?;

        let content = match self.ops.read_file(path).await {
            Ok(content) => content,
            Err(e @ SandboxError::OutsideRoots { .. }) => return Err(e.into()),
            Err(e) => return Ok(ToolResult::failure(format!("Failed to read file: {e}"))),
        };

        if offset == 1 && limit.is_none() {
            debug!(path, bytes = content.len(), "File read");
            return Ok(ToolResult::text(content));
        }

        let total = content.lines().count();
        let selected: Vec<&str> = content
            .lines()
            .skip(offset - 1)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        let last = offset + selected.len().saturating_sub(1);
        debug!(path, offset, lines = selected.len(), "File range read");

        Ok(ToolResult::text(format!(
            "[lines {offset}-{last} of {total}]\n{}",
            selected.join("\n")
        )))
    }
}
