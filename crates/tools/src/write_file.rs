//! File write tool — create or overwrite files inside the sandbox.

use std::sync::Arc;

use async_trait::async_trait;
use ferrocode_core::error::ToolError;
use ferrocode_core::tool::{Tool, ToolContext, ToolResult};
use ferrocode_security::{SafeFileOps, SandboxError};
use tracing::info;

use crate::args;

pub struct WriteFileTool {
    ops: Arc<SafeFileOps>,
}

impl WriteFileTool {
    pub fn new(ops: Arc<SafeFileOps>) -> Self {
        Self { ops }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace. Creates the file and parent directories if needed, overwrites if it exists."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the workspace root"
                },
                "content": {
                    "type": "string",
                    "description": "The full new file content"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let path = args::required_str(&arguments, "path")?;
        let content = args::required_str(&arguments, "content")?;

        // Nothing has been written yet, so a cancelled call has no effect.
        if ctx.is_cancelled() {
            return Err(ToolError::Cancelled("write_file".into()));
        }

        match self.ops.write_file(path, content).await {
            Ok(written) => {
                let shown = self.ops.display_path(&written);
                info!(path = %shown, bytes = content.len(), "File written by agent");
                Ok(ToolResult::text(format!(
                    "Successfully wrote {} bytes to {shown}",
                    content.len()
                )))
            }
            Err(e @ SandboxError::OutsideRoots { .. }) => Err(e.into()),
            Err(e) => Ok(ToolResult::failure(format!("Failed to write file: {e}"))),
        }
    }
}
