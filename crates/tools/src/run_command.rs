//! Command tool — run allowlisted shell commands in the workspace.
//!
//! Supports command allowlisting, workspace scoping, and cancellation.
//! The child process is killed when the call is cancelled or times out.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use ferrocode_core::error::ToolError;
use ferrocode_core::tool::{Tool, ToolContext, ToolResult};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::args;

/// Separators that start a new command inside one shell line.
/// `&&` and `||` come before their single-character forms.
const CHAIN_SEPARATORS: &[&str] = &["&&", "||", ";", "|", "&", "\n"];

/// Descriptor duplications that never touch a file.
const FD_DUPLICATIONS: &[&str] = &["2>&1", "1>&2", ">&2"];

/// Execute shell commands with safety constraints.
pub struct RunCommandTool {
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
    /// Working directory for every command
    workdir: PathBuf,
}

impl RunCommandTool {
    pub fn new(allowed_commands: Vec<String>, workdir: PathBuf) -> Self {
        Self {
            allowed_commands,
            workdir,
        }
    }

    /// Check every command in a chained line against the allowlist.
    /// Command substitution and file redirection are refused outright when
    /// an allowlist is set.
    fn check_allowed(&self, command: &str) -> Result<(), String> {
        if self.allowed_commands.is_empty() {
            return Ok(());
        }
        if command.contains('`') || command.contains("$(") || command.contains("<(") {
            return Err("command substitution is not allowed".into());
        }

        let mut line = command.to_string();
        for dup in FD_DUPLICATIONS {
            line = line.replace(dup, " ");
        }
        if line.contains('>') || line.contains('<') {
            return Err("redirection is not allowed".into());
        }

        let mut segments = vec![line];
        for sep in CHAIN_SEPARATORS {
            segments = segments
                .iter()
                .flat_map(|s| s.split(sep).map(str::to_string).collect::<Vec<_>>())
                .collect();
        }

        for segment in segments {
            let base_cmd = segment.split_whitespace().next().unwrap_or("").trim();
            if base_cmd.is_empty() {
                continue;
            }
            if !self.allowed_commands.iter().any(|a| a == base_cmd) {
                return Err(format!("Command '{base_cmd}' not in allowlist"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace root and return its exit code, stdout and stderr. Use it to build, test, or inspect the project."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let command = args::required_str(&arguments, "command")?.trim();
        if command.is_empty() {
            return Err(ToolError::InvalidArguments("'command' must not be empty".into()));
        }

        self.check_allowed(command)
            .map_err(|reason| ToolError::PermissionDenied {
                tool_name: "run_command".into(),
                reason,
            })?;

        debug!(command = %command, workdir = %self.workdir.display(), "Executing command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| ToolError::ExecutionFailed {
            tool_name: "run_command".into(),
            reason: e.to_string(),
        })?;

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            biased;
            _ = ctx.cancel_token().cancelled() => {
                warn!(command = %command, "Command cancelled, killing process");
                return Err(ToolError::Cancelled("run_command".into()));
            }
            output = child.wait_with_output() => output,
        };

        let output = output.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "run_command".into(),
            reason: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);

        if output.status.success() {
            let text = if stderr.trim().is_empty() {
                stdout
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            };
            let text = text.trim();
            Ok(ToolResult::text(if text.is_empty() { "(no output)" } else { text }))
        } else {
            warn!(command = %command, exit_code = code, "Command failed");
            Ok(ToolResult::failure(
                format!("[exit code: {code}]\n{stdout}\n{stderr}").trim().to_string(),
            ))
        }
    }
}
