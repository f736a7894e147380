//! `ferrocode chat` — Interactive or single-message chat through the event bridge.

use std::io::Write;

use ferrocode_agent::{ChatMessage, ChatMessageKind, EventBridge};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{CmdResult, GlobalOpts, Runtime, cancel_on_ctrl_c};

pub async fn run(opts: &GlobalOpts, message: Option<String>, resume: Option<String>) -> CmdResult {
    let config = opts.load_config()?;
    let runtime = Runtime::build(config)?;
    let history = runtime.history();

    let mut bridge = EventBridge::new(runtime.runner(), runtime.config.bridge.buffer_size);
    if let Some(store) = &history {
        bridge = bridge.with_history(store.clone());
        if let Some(id) = &resume {
            let session = store.load(id).await?;
            bridge = bridge.with_session(session);
        }
    } else if resume.is_some() {
        return Err("Session history is disabled in the config".into());
    }
    let mut events = bridge.messages().ok_or("event stream already taken")?;

    if let Some(msg) = message {
        bridge.send_with(&cancel_on_ctrl_c(), &msg)?;
        let outcome = print_turn(&mut events).await;
        bridge.close().await?;
        return match outcome {
            Some(ChatMessageKind::Error) => Err("run aborted".into()),
            _ => Ok(()),
        };
    }

    println!();
    println!("  ferrocode — interactive mode");
    println!();
    println!("  Provider:  {}", runtime.config.provider);
    println!("  Model:     {}", runtime.config.model);
    println!("  Workspace: {}", runtime.ops.primary_root().display());
    println!("  Tools:     {}", runtime.tools.names().join(", "));
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C cancels the running turn. Type 'exit' or press Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let turn = CancellationToken::new();
        bridge.send_with(&turn, line)?;
        let printing = print_turn(&mut events);
        tokio::pin!(printing);
        loop {
            tokio::select! {
                _ = &mut printing => break,
                _ = tokio::signal::ctrl_c(), if !turn.is_cancelled() => {
                    eprintln!("\n  Cancelling turn...");
                    turn.cancel();
                }
            }
        }
    }

    bridge.close().await?;
    debug!(dropped = bridge.dropped(), "Chat finished");
    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Print the events of one turn. Returns the kind of the final event, or
/// `None` if the stream ended first.
async fn print_turn(events: &mut mpsc::Receiver<ChatMessage>) -> Option<ChatMessageKind> {
    while let Some(event) = events.recv().await {
        print_event(&event);
        if event.kind.is_terminal() {
            return Some(event.kind);
        }
    }
    None
}

fn print_event(event: &ChatMessage) {
    match event.kind {
        ChatMessageKind::User | ChatMessageKind::System => {}
        ChatMessageKind::ToolCall => {
            eprintln!("  ⚙ {} {}", event.sender, event.text);
        }
        ChatMessageKind::ToolProgress => {
            match (event.meta("step"), event.meta("total_steps")) {
                (Some(step), Some(total)) => eprintln!("    … {} ({step}/{total})", event.text),
                _ => eprintln!("    … {}", event.text),
            }
        }
        ChatMessageKind::ToolResult => {
            let mark = if event.meta("success") == Some("true") { "✓" } else { "✗" };
            let lines = event.text.lines().count();
            eprintln!("  {mark} {} ({lines} lines)", event.sender);
        }
        ChatMessageKind::Assistant => {
            println!();
            for line in event.text.lines() {
                println!("  Assistant > {line}");
            }
            if event.meta("outcome") == Some("recovered") {
                eprintln!("  (answered after recovering from a tool error)");
            }
            println!();
        }
        ChatMessageKind::Error => {
            eprintln!("  [Error] {}", event.text);
            println!();
        }
    }
}
