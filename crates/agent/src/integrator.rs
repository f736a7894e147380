//! Command integration: run the agent for a task with a structured answer.
//!
//! A [`StructuredTask`] supplies the system prompt and user prompt, and
//! knows how to turn the model's final answer into a typed value. The
//! integrator runs the agent (tools included), then parses and validates
//! that answer. A run that aborts or an answer that does not parse is an
//! [`IntegrationError`].

use std::fmt;
use std::sync::Arc;

use ferrocode_providers::function_call::json_objects;
use ferrocode_security::SafeFileOps;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::runner::{AgentRunner, RunError, RunResult};

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("Agent run failed: {0}")]
    Run(RunError),

    #[error("No structured output in the answer: {0}")]
    NoStructuredOutput(String),

    #[error("Invalid {task} output: {reason}")]
    Invalid { task: String, reason: String },
}

/// A task whose final answer must parse into `Output`.
pub trait StructuredTask: Send + Sync {
    type Output: Send;

    fn name(&self) -> &str;

    fn system_prompt(&self) -> String;

    fn prompt(&self) -> String;

    fn parse(&self, answer: &str) -> Result<Self::Output, IntegrationError>;
}

/// Parsed output plus the run that produced it.
#[derive(Debug)]
pub struct TaskReport<T> {
    pub output: T,
    pub run: RunResult,
}

pub struct CommandIntegrator {
    runner: AgentRunner,
}

impl CommandIntegrator {
    pub fn new(runner: AgentRunner) -> Self {
        Self { runner }
    }

    pub async fn run_task<T: StructuredTask>(
        &self,
        cancel: &CancellationToken,
        task: &T,
    ) -> Result<TaskReport<T::Output>, IntegrationError> {
        info!(task = task.name(), "Running structured task");
        let runner = self.runner.clone().with_system_prompt(task.system_prompt());
        let run = runner.run(cancel, &task.prompt()).await;

        if let Some(err) = &run.error {
            return Err(IntegrationError::Run(err.clone()));
        }
        let output = task.parse(&run.final_response)?;
        debug!(task = task.name(), iterations = run.iterations, "Structured task parsed");
        Ok(TaskReport { output, run })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Inspect,
    Create,
    Modify,
    Delete,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inspect => "inspect",
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,
    pub action: PlanAction,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub summary: String,
    pub steps: Vec<PlanStep>,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary)?;
        for (i, step) in self.steps.iter().enumerate() {
            write!(f, "\n{}. [{}] {}", i + 1, step.action, step.description)?;
            for file in &step.files {
                write!(f, "\n     - {file}")?;
            }
        }
        Ok(())
    }
}

/// Ask the agent for an implementation plan of `goal`.
///
/// Every file named in the plan must lie inside the sandbox roots.
pub struct PlanTask {
    goal: String,
    ops: Arc<SafeFileOps>,
}

impl PlanTask {
    pub fn new(goal: impl Into<String>, ops: Arc<SafeFileOps>) -> Self {
        Self {
            goal: goal.into(),
            ops,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> IntegrationError {
        IntegrationError::Invalid {
            task: self.name().to_string(),
            reason: reason.into(),
        }
    }

    fn validate(&self, plan: &Plan) -> Result<(), IntegrationError> {
        if plan.summary.trim().is_empty() {
            return Err(self.invalid("summary is empty"));
        }
        if plan.steps.is_empty() {
            return Err(self.invalid("plan has no steps"));
        }
        for (i, step) in plan.steps.iter().enumerate() {
            if step.description.trim().is_empty() {
                return Err(self.invalid(format!("step {} has no description", i + 1)));
            }
            if step.action != PlanAction::Inspect && step.files.is_empty() {
                return Err(self.invalid(format!(
                    "step {} ({}) names no files",
                    i + 1,
                    step.action
                )));
            }
            for file in &step.files {
                self.ops
                    .validate_path(file)
                    .map_err(|e| self.invalid(format!("step {}: {e}", i + 1)))?;
            }
        }
        Ok(())
    }
}

impl StructuredTask for PlanTask {
    type Output = Plan;

    fn name(&self) -> &str {
        "plan"
    }

    fn system_prompt(&self) -> String {
        "You are ferrocode, a coding assistant that plans changes before making them. \
Inspect the project with the available tools, but do not modify any files. \
When you are ready, answer with ONLY a JSON object of this form:\n\
{\"summary\": \"<one paragraph>\", \"steps\": [{\"description\": \"<what to do>\", \
\"action\": \"inspect|create|modify|delete\", \"files\": [\"<workspace-relative path>\"]}]}"
            .to_string()
    }

    fn prompt(&self) -> String {
        format!("Plan the following change: {}", self.goal)
    }

    fn parse(&self, answer: &str) -> Result<Plan, IntegrationError> {
        let candidates = json_objects(answer);
        if candidates.is_empty() {
            return Err(IntegrationError::NoStructuredOutput(
                "expected a JSON plan object".into(),
            ));
        }
        let mut last_error = None;
        for value in candidates {
            match serde_json::from_value::<Plan>(value) {
                Ok(plan) => {
                    self.validate(&plan)?;
                    return Ok(plan);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(IntegrationError::NoStructuredOutput(format!(
            "no JSON object matched the plan shape: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}
