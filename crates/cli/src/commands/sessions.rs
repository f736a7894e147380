//! `ferrocode sessions` — Inspect saved chat sessions.

use clap::Subcommand;
use ferrocode_core::message::Role;

use super::{CmdResult, GlobalOpts, history_store};

#[derive(Subcommand)]
pub enum SessionsAction {
    /// List saved sessions, most recent first
    List,
    /// Print the transcript of a session
    Show { id: String },
    /// Delete a session
    Delete { id: String },
}

pub async fn run(opts: &GlobalOpts, action: Option<SessionsAction>) -> CmdResult {
    let config = opts.load_config()?;
    let store = history_store(&config).ok_or("Session history is disabled in the config")?;

    match action.unwrap_or(SessionsAction::List) {
        SessionsAction::List => {
            let sessions = store.list().await?;
            if sessions.is_empty() {
                println!("No saved sessions in {}", config.history_dir().display());
                return Ok(());
            }
            for s in sessions {
                println!(
                    "{}  {}  {:>3} msgs  {}  {}",
                    s.id,
                    s.updated_at.format("%Y-%m-%d %H:%M"),
                    s.message_count,
                    s.model,
                    s.title
                );
            }
        }
        SessionsAction::Show { id } => {
            let session = store.load(&id).await?;
            println!("# {} ({} / {})", session.title, session.provider, session.model);
            for message in &session.messages {
                let who = match message.role {
                    Role::User => "You",
                    Role::Assistant => "Assistant",
                    Role::System => "System",
                    Role::Tool => "Tool",
                };
                println!();
                println!("{who} > {}", message.content);
            }
        }
        SessionsAction::Delete { id } => {
            if store.delete(&id).await? {
                println!("Deleted session {id}");
            } else {
                println!("No session {id}");
            }
        }
    }
    Ok(())
}
