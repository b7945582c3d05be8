// Terminal chat over the same application state the web UI uses.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

use crate::app_state::AppState;
use crate::messages::{ChatMessage, Sender};
use crate::registry::ChatItem;

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Send(String),
    New,
    List,
    /// 1-based position in the chat list.
    Select(usize),
    Rename(usize, String),
    Delete(usize),
    Help,
    Quit,
}

impl ChatCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(ChatCommand::Send(line.to_string()));
        };
        let mut parts = rest.splitn(3, ' ');
        let name = parts.next().unwrap_or_default();
        let index = |arg: Option<&str>| -> Result<usize, String> {
            arg.and_then(|a| a.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("/{} needs a chat number (see /list)", name))
        };
        match name {
            "new" => Ok(ChatCommand::New),
            "list" => Ok(ChatCommand::List),
            "select" => Ok(ChatCommand::Select(index(parts.next())?)),
            "delete" => Ok(ChatCommand::Delete(index(parts.next())?)),
            "rename" => {
                let n = index(parts.next())?;
                let title = parts.next().map(str::trim).unwrap_or_default();
                if title.is_empty() {
                    return Err("/rename needs a title".to_string());
                }
                Ok(ChatCommand::Rename(n, title.to_string()))
            }
            "help" => Ok(ChatCommand::Help),
            "quit" | "exit" => Ok(ChatCommand::Quit),
            other => Err(format!("Unknown command /{} (try /help)", other)),
        }
    }
}

const HELP: &str = "Commands: /new, /list, /select N, /rename N TITLE, /delete N, /quit. \
                    Anything else is sent to Cairo Pilot.";

fn format_message(message: &ChatMessage) -> String {
    let who = match message.sender {
        Sender::User => "You",
        Sender::Bot => "Cairo Pilot",
    };
    format!(
        "[{}] {}: {}",
        message.timestamp.format("%H:%M:%S"),
        who,
        message.text
    )
}

/// Chat at a 1-based list position; 0 and out-of-range positions find nothing.
async fn chat_at(app: &AppState, position: usize) -> Option<ChatItem> {
    let index = position.checked_sub(1)?;
    app.snapshot().await.chats.get(index).cloned()
}

/// Runs one command, writing its output. Returns false when the user quits.
pub async fn execute<W>(app: &AppState, command: ChatCommand, out: &mut W) -> Result<bool>
where
    W: AsyncWrite + Unpin,
{
    let mut lines: Vec<String> = Vec::new();
    match command {
        ChatCommand::Quit => return Ok(false),
        ChatCommand::Help => lines.push(HELP.to_string()),
        ChatCommand::Send(text) => match app.send_message(&text).await {
            Ok(Some(reply)) => lines.push(format_message(&reply)),
            Ok(None) => {}
            Err(e) => lines.push(format!("Not sent: {}", e)),
        },
        ChatCommand::New => {
            app.new_chat().await;
            lines.extend(app.snapshot().await.messages.iter().map(format_message));
        }
        ChatCommand::List => {
            let snapshot = app.snapshot().await;
            if snapshot.chats.is_empty() {
                lines.push("No chats. Use /new to start one.".to_string());
            }
            for (i, chat) in snapshot.chats.iter().enumerate() {
                let marker = if Some(chat.id) == snapshot.active_chat_id { '*' } else { ' ' };
                lines.push(format!("{} {}. {}", marker, i + 1, chat.title));
            }
        }
        ChatCommand::Select(n) => match chat_at(app, n).await {
            Some(chat) => {
                app.select_chat(chat.id).await?;
                lines.extend(app.snapshot().await.messages.iter().map(format_message));
            }
            None => lines.push(format!("No chat number {}", n)),
        },
        ChatCommand::Rename(n, title) => match chat_at(app, n).await {
            Some(chat) => {
                app.rename_chat(chat.id, title.as_str()).await;
                lines.push(format!("Renamed '{}' to '{}'", chat.title, title));
            }
            None => lines.push(format!("No chat number {}", n)),
        },
        ChatCommand::Delete(n) => match chat_at(app, n).await {
            Some(chat) => {
                app.delete_chat(chat.id).await;
                lines.push(format!("Deleted '{}'", chat.title));
            }
            None => lines.push(format!("No chat number {}", n)),
        },
    }
    for line in lines {
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
    }
    out.flush().await?;
    Ok(true)
}

/// Reads commands from stdin until EOF or /quit.
pub async fn run_terminal_chat(app: AppState) -> Result<()> {
    info!("Starting terminal chat...");
    let mut stdout = tokio::io::stdout();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    stdout.write_all(format!("{}\n", HELP).as_bytes()).await?;
    for message in app.snapshot().await.messages {
        stdout.write_all(format!("{}\n", format_message(&message)).as_bytes()).await?;
    }
    stdout.flush().await?;

    while let Some(line) = input.next_line().await.context("Failed to read from stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let keep_going = match ChatCommand::parse(&line) {
            Ok(command) => execute(&app, command, &mut stdout).await?,
            Err(e) => {
                stdout.write_all(format!("{}\n", e).as_bytes()).await?;
                true
            }
        };
        if !keep_going {
            break;
        }
    }
    info!("Terminal chat finished");
    Ok(())
}
