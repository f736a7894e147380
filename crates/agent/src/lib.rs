//! The agent runtime of ferrocode.
//!
//! The runner follows a **call → act → observe** cycle:
//!
//! 1. **Receive** a prompt (from the CLI or the event bridge)
//! 2. **Render** the conversation for the configured LLM backend
//! 3. **If a function call**: execute the tool, append its result, go to 2
//! 4. **If text**: that is the answer
//!
//! The loop ends with an answer, or when the iteration cap, a timeout,
//! cancellation or a transport failure stops it.

pub mod bridge;
pub mod events;
pub mod integrator;
pub mod prompt;
pub mod queue;
pub mod runner;
pub mod sanitize;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use bridge::{BridgeError, EventBridge};
pub use events::{ChatMessage, ChatMessageKind, ToolProgressState};
pub use integrator::{
    CommandIntegrator, IntegrationError, Plan, PlanAction, PlanStep, PlanTask, StructuredTask,
    TaskReport,
};
pub use queue::DropQueue;
pub use runner::{AgentRunner, NoopObserver, RunError, RunObserver, RunOutcome, RunResult};
