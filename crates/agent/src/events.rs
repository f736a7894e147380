//! Events streamed to front ends by the event bridge.
//!
//! A front end (the plain CLI printer, a TUI) consumes a sequence of
//! `ChatMessage`s per turn:
//! - `user`          the prompt that started the turn
//! - `tool_call`     a tool is starting
//! - `tool_progress` a running tool reported progress
//! - `tool_result`   the tool finished
//! - `assistant`     the final answer (last event of a successful turn)
//! - `error`         the run aborted (last event of a failed turn)

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ferrocode_core::message::ToolCall;
use ferrocode_core::tool::ProgressUpdate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMessageKind {
    User,
    Assistant,
    ToolCall,
    ToolProgress,
    ToolResult,
    Error,
    System,
}

impl ChatMessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::ToolCall => "tool_call",
            Self::ToolProgress => "tool_progress",
            Self::ToolResult => "tool_result",
            Self::Error => "error",
            Self::System => "system",
        }
    }

    /// Whether this event ends a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Assistant | Self::Error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub kind: ChatMessageKind,
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ChatMessage {
    fn new(kind: ChatMessageKind, sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            sender: sender.into(),
            text: text.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ChatMessageKind::User, "you", text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(ChatMessageKind::Assistant, "assistant", text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(ChatMessageKind::System, "system", text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(ChatMessageKind::Error, "system", text)
    }

    pub fn tool_start(call: &ToolCall) -> Self {
        Self::new(ChatMessageKind::ToolCall, call.name.clone(), call.arguments.clone())
            .with_meta("call_id", &call.id)
            .with_meta("tool", &call.name)
    }

    pub fn tool_progress(call_id: &str, tool_name: &str, update: &ProgressUpdate) -> Self {
        let mut msg = Self::new(ChatMessageKind::ToolProgress, tool_name, update.status.clone())
            .with_meta("call_id", call_id)
            .with_meta("tool", tool_name)
            .with_meta("progress", format!("{:.2}", update.progress));
        if let (Some(step), Some(total)) = (update.step, update.total_steps) {
            msg = msg.with_meta("step", step).with_meta("total_steps", total);
        }
        msg
    }

    pub fn tool_result(call: &ToolCall, success: bool, output: impl Into<String>) -> Self {
        Self::new(ChatMessageKind::ToolResult, call.name.clone(), output)
            .with_meta("call_id", &call.id)
            .with_meta("tool", &call.name)
            .with_meta("success", success)
    }
}

/// Live state of a running tool, keyed by call id in the bridge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolProgressState {
    pub tool_name: String,
    pub started_at: DateTime<Utc>,
    pub progress: f32,
    pub status: String,
    pub step: Option<u32>,
    pub total_steps: Option<u32>,
}

impl ToolProgressState {
    pub fn started(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            started_at: Utc::now(),
            progress: 0.0,
            status: "started".into(),
            step: None,
            total_steps: None,
        }
    }

    pub fn apply(&mut self, update: &ProgressUpdate) {
        self.progress = update.progress;
        self.status = update.status.clone();
        self.step = update.step;
        self.total_steps = update.total_steps;
    }
}
