//! ferrocode CLI — the main entry point.
//!
//! Commands:
//! - `chat`      — Interactive chat or single-message mode
//! - `plan`      — Produce a validated change plan for a goal
//! - `config`    — Show, validate or print the default configuration
//! - `sessions`  — List, show or delete saved sessions
//! - `providers` — List supported LLM providers

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ferrocode",
    about = "ferrocode — an AI coding assistant for the terminal",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (default: ~/.ferrocode/config.toml)
    #[arg(long, global = true, env = "FERROCODE_CONFIG")]
    config: Option<PathBuf>,

    /// Workspace root the tools are sandboxed to (default: current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the coding agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue a saved session
        #[arg(long)]
        resume: Option<String>,
    },

    /// Ask the agent for a step-by-step plan without changing files
    Plan {
        /// What should change
        goal: String,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration commands (default: print the default config)
    Config {
        #[command(subcommand)]
        action: Option<commands::config_cmd::ConfigAction>,
    },

    /// Saved session commands (default: list)
    Sessions {
        #[command(subcommand)]
        action: Option<commands::sessions::SessionsAction>,
    },

    /// List supported LLM providers
    Providers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout only carries answers.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let opts = commands::GlobalOpts {
        config: cli.config,
        workspace: cli.workspace,
    };

    match cli.command {
        Commands::Chat { message, resume } => commands::chat::run(&opts, message, resume).await?,
        Commands::Plan { goal, json } => commands::plan::run(&opts, &goal, json).await?,
        Commands::Config { action } => commands::config_cmd::run(&opts, action)?,
        Commands::Sessions { action } => commands::sessions::run(&opts, action).await?,
        Commands::Providers => commands::providers::run()?,
    }

    Ok(())
}
