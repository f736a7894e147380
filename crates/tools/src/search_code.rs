//! Code search tool: regex search over files in the sandbox.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use ferrocode_core::error::ToolError;
use ferrocode_core::tool::{ProgressUpdate, Tool, ToolContext, ToolResult};
use ferrocode_security::SafeFileOps;
use regex_lite::{Regex, RegexBuilder};
use tracing::debug;
use walkdir::WalkDir;

use crate::{args, is_ignored_dir};

const DEFAULT_MAX_RESULTS: usize = 50;
const MAX_FILE_BYTES: u64 = 1024 * 1024;
const MAX_LINE_CHARS: usize = 240;
const PROGRESS_BATCH: usize = 25;

pub struct SearchCodeTool {
    ops: Arc<SafeFileOps>,
}

impl SearchCodeTool {
    pub fn new(ops: Arc<SafeFileOps>) -> Self {
        Self { ops }
    }
}

/// Collect candidate files under `root`, skipping ignored and oversized ones.
fn collect_files(root: PathBuf, extension: Option<String>) -> Vec<PathBuf> {
    WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && e.depth() > 0 && is_ignored_dir(e.file_name())))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.metadata().map(|m| m.len() <= MAX_FILE_BYTES).unwrap_or(false))
        .filter(|e| match &extension {
            Some(ext) => e.path().extension().and_then(|x| x.to_str()) == Some(ext.as_str()),
            None => true,
        })
        .map(|e| e.into_path())
        .collect()
}

fn clip(line: &str) -> String {
    let line = line.trim();
    if line.chars().count() <= MAX_LINE_CHARS {
        return line.to_string();
    }
    let mut clipped: String = line.chars().take(MAX_LINE_CHARS).collect();
    clipped.push('…');
    clipped
}

#[async_trait]
impl Tool for SearchCodeTool {
    fn name(&self) -> &str {
        "search_code"
    }

    fn description(&self) -> &str {
        "Search file contents in the workspace with a regular expression. Returns matching lines as path:line: text. Useful for finding definitions and usages."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search, relative to the workspace root (default: root)"
                },
                "extension": {
                    "type": "string",
                    "description": "Only search files with this extension, e.g. \"rs\""
                },
                "case_sensitive": {
                    "type": "boolean",
                    "description": "Match case exactly (default: false)"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of matching lines (default: 50)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let pattern = args::required_str(&arguments, "pattern")?;
        let path = args::optional_str(&arguments, "path")?.unwrap_or(".");
        let extension = args::optional_str(&arguments, "extension")?
            .map(|e| e.trim_start_matches('.').to_string());
        let case_sensitive = args::optional_bool(&arguments, "case_sensitive")?.unwrap_or(false);
        let max_results = args::optional_usize(&arguments, "max_results")?
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .max(1);

        let regex: Regex = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| ToolError::InvalidArguments(format!("invalid pattern: {e}")))?;

        let root = self.ops.validate_path(path)?;
        if !root.exists() {
            return Ok(ToolResult::failure(format!("Path not found: {path}")));
        }

        let files = tokio::task::spawn_blocking(move || collect_files(root, extension))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "search_code".into(),
                reason: e.to_string(),
            })?;

        let total = files.len();
        debug!(pattern, files = total, "Searching");
        ctx.report(ProgressUpdate::step(0, total as u32, format!("searching {total} files")));

        let mut matches = Vec::new();
        let mut truncated = false;

        'files: for (index, file) in files.iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(ToolError::Cancelled("search_code".into()));
            }
            if index > 0 && index % PROGRESS_BATCH == 0 {
                ctx.report(ProgressUpdate::step(
                    index as u32,
                    total as u32,
                    format!("{} matches so far", matches.len()),
                ));
            }

            // Binary and non-UTF-8 files are skipped.
            let Ok(content) = tokio::fs::read_to_string(file).await else {
                continue;
            };
            let shown = self.ops.display_path(file);
            for (line_no, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    if matches.len() >= max_results {
                        truncated = true;
                        break 'files;
                    }
                    matches.push(format!("{shown}:{}: {}", line_no + 1, clip(line)));
                }
            }
        }

        ctx.report(ProgressUpdate::step(total as u32, total as u32, "done"));

        if matches.is_empty() {
            return Ok(ToolResult::text(format!("No matches found for pattern: {pattern}")));
        }
        let mut output = matches.join("\n");
        if truncated {
            output.push_str(&format!("\n\n... (showing first {max_results} matches)"));
        }
        Ok(ToolResult::text(output))
    }
}
