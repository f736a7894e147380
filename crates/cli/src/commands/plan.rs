//! `ferrocode plan` — Ask the agent for a validated change plan.

use ferrocode_agent::{CommandIntegrator, PlanTask};

use super::{CmdResult, GlobalOpts, Runtime, cancel_on_ctrl_c};

pub async fn run(opts: &GlobalOpts, goal: &str, json: bool) -> CmdResult {
    let config = opts.load_config()?;
    let runtime = Runtime::build(config)?;

    let integrator = CommandIntegrator::new(runtime.runner());
    let task = PlanTask::new(goal, runtime.ops.clone());

    eprint!("  Planning...");
    let cancel = cancel_on_ctrl_c();
    let result = integrator.run_task(&cancel, &task).await;
    eprint!("\r             \r");

    let report = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report.output)?);
    } else {
        println!("{}", report.output);
        eprintln!();
        eprintln!(
            "  ({} LLM calls, {} tool calls)",
            report.run.iterations, report.run.tool_calls
        );
    }
    Ok(())
}
