//! # ferrocode Core
//!
//! Domain types, traits, and error definitions for the ferrocode coding agent.
//! This crate has **no transport dependencies**: it defines the domain model
//! that the provider, tool, history and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here. Implementations live in their own crates,
//! so backends can be swapped via configuration and tests can script
//! the model's side of the conversation.

pub mod error;
pub mod history;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, HistoryError, ProviderError, Result, ToolError};
pub use history::{HistoryStore, Session, SessionSummary};
pub use message::{Message, Role, ToolCall};
pub use provider::{FunctionCallResponse, LlmClient, LlmRequest, ToolDefinition};
pub use tool::{ProgressSink, ProgressUpdate, Tool, ToolContext, ToolRegistry, ToolResult};
