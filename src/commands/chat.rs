//! Interactive chat handler
//!
//! Runs a readline loop over a [`ChatOrchestrator`]. Lines starting with
//! `/` are chat commands; everything else is sent to the model together
//! with whatever files are staged.

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use super::connect_backend;
use crate::attachments::{AttachmentPipeline, ChatAttachment, LocalFile, LocalPreviews};
use crate::chat::{ChatOrchestrator, ChatSettings, Role, SaveState, TranscriptEntry};
use crate::config::Config;
use crate::error::Result;
use crate::prompts::format_size;
use crate::providers::GeminiClient;

/// Errors from parsing a chat command line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },

    /// Argument could not be understood
    #[error("Invalid argument for {command}: {arg}")]
    InvalidArgument { command: String, arg: String },
}

/// A line of input in the chat loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Stage a file for the next message
    Attach(PathBuf),
    /// Remove a staged file by its 1-based position
    Detach(usize),
    /// Show staged files
    Files,
    /// Start a new conversation
    New,
    /// List conversations
    List,
    /// Show help
    Help,
    /// Leave the loop
    Quit,
    /// Text to send
    Message(String),
}

/// Parse one line of chat input
///
/// Command names are case-insensitive; arguments keep their case.
///
/// # Examples
///
/// ```
/// use studymate::commands::chat::{parse_chat_command, ChatCommand};
///
/// assert_eq!(parse_chat_command("/detach 2").unwrap(), ChatCommand::Detach(2));
/// assert_eq!(
///     parse_chat_command("what is ATP?").unwrap(),
///     ChatCommand::Message("what is ATP?".to_string())
/// );
/// ```
pub fn parse_chat_command(input: &str) -> std::result::Result<ChatCommand, CommandError> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return Ok(ChatCommand::Message(trimmed.to_string()));
    }

    let (name, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((name, arg)) => (name.to_lowercase(), arg.trim()),
        None => (trimmed.to_lowercase(), ""),
    };

    match name.as_str() {
        "/attach" if arg.is_empty() => Err(CommandError::MissingArgument {
            command: "/attach".to_string(),
            usage: "/attach <path>".to_string(),
        }),
        "/attach" => Ok(ChatCommand::Attach(PathBuf::from(arg))),
        "/detach" if arg.is_empty() => Err(CommandError::MissingArgument {
            command: "/detach".to_string(),
            usage: "/detach <number>".to_string(),
        }),
        "/detach" => match arg.parse::<usize>() {
            Ok(n) if n > 0 => Ok(ChatCommand::Detach(n)),
            _ => Err(CommandError::InvalidArgument {
                command: "/detach".to_string(),
                arg: arg.to_string(),
            }),
        },
        "/files" => Ok(ChatCommand::Files),
        "/new" => Ok(ChatCommand::New),
        "/list" => Ok(ChatCommand::List),
        "/help" | "/?" => Ok(ChatCommand::Help),
        "/quit" | "/exit" => Ok(ChatCommand::Quit),
        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

/// Start interactive chat
///
/// Uses the signed-in user (if any) from the cached session. Memory
/// follows `chat.memory_enabled`, which `--no-memory` turns off. Without
/// `--conversation` the most recent conversation is resumed.
pub async fn run_chat(config: Config, conversation: Option<String>) -> Result<()> {
    config.require_genai()?;
    let backend = connect_backend(&config)?;
    let user = backend.auth.current_user().await;
    let memory = config.chat.memory_enabled;

    let pipeline = AttachmentPipeline::new(
        backend.storage.clone(),
        Arc::new(LocalPreviews::new()),
        config.backend.attachments_bucket.clone(),
    )
    .with_signed_url_ttl(config.backend.signed_url_ttl_seconds);

    let chat = ChatOrchestrator::new(
        Arc::new(GeminiClient::from_config(&config.genai)?),
        backend.db.clone(),
        pipeline,
        ChatSettings {
            model: config.genai.chat_model.clone(),
            default_title: config.chat.default_title.clone(),
        },
    );

    tracing::info!(
        signed_in = user.is_some(),
        memory_enabled = memory,
        "Starting interactive chat"
    );
    if let Err(e) = chat.activate(user.clone(), memory, conversation.as_deref()).await {
        println!("{}", format!("{}", e).red());
    }

    print_banner(user.as_ref().map(|u| u.email.as_str()), memory, &chat);
    for entry in chat.transcript() {
        print_entry(&entry);
    }

    let mut rl = DefaultEditor::new()?;
    loop {
        let staged = chat.staged_names().await.len();
        let prompt = if staged > 0 {
            format!("[{} file(s)] >> ", staged)
        } else {
            ">> ".to_string()
        };

        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                tracing::error!("Readline error: {}", e);
                break;
            }
        };
        if line.trim().is_empty() && staged == 0 {
            continue;
        }
        rl.add_history_entry(line.trim())?;

        let command = match parse_chat_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e.to_string().yellow());
                continue;
            }
        };

        match command {
            ChatCommand::Quit => break,
            ChatCommand::Help => print_help(),
            ChatCommand::Attach(path) => match LocalFile::read(&path).await {
                Ok(file) => {
                    let label = format!("Staged {} ({})", file.name, format_size(file.size()));
                    chat.stage_files(vec![file]).await;
                    println!("{}", label.green());
                }
                Err(e) => println!("{}", format!("Could not read {}: {}", path.display(), e).red()),
            },
            ChatCommand::Detach(n) => match chat.remove_staged(n - 1).await {
                Some(file) => println!("{}", format!("Removed {}", file.name).green()),
                None => println!("{}", format!("No staged file #{}", n).yellow()),
            },
            ChatCommand::Files => {
                let names = chat.staged_names().await;
                if names.is_empty() {
                    println!("{}", "No files staged".dimmed());
                }
                for (i, name) in names.iter().enumerate() {
                    println!("  {}. {}", i + 1, name);
                }
            }
            ChatCommand::New => match chat.new_conversation().await {
                Ok(conversation) => {
                    println!("{}", format!("Started conversation {}", conversation.id).green());
                    for entry in chat.transcript() {
                        print_entry(&entry);
                    }
                }
                Err(e) => println!("{}", format!("{}", e).red()),
            },
            ChatCommand::List => match chat.list_conversations().await {
                Ok(conversations) => {
                    let current = chat.conversation().map(|c| c.id);
                    for conversation in conversations {
                        let marker = if current.as_deref() == Some(conversation.id.as_str()) {
                            "*"
                        } else {
                            " "
                        };
                        println!("{} {}  {}", marker, conversation.id.dimmed(), conversation.title);
                    }
                }
                Err(e) => println!("{}", format!("{}", e).red()),
            },
            ChatCommand::Message(text) => match chat.send(&text).await {
                Ok(entries) => {
                    for entry in entries.iter().filter(|e| e.message.role == Role::Model) {
                        print_entry(entry);
                    }
                    for entry in entries.iter().filter(|e| e.message.role == Role::User) {
                        print_save_state(entry);
                    }
                }
                Err(e) => println!("{}", format!("{}", e).yellow()),
            },
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn print_banner(email: Option<&str>, memory: bool, chat: &ChatOrchestrator) {
    println!("{}", "StudyMate".bold().cyan());
    match email {
        Some(email) => println!("Signed in as {}", email.bold()),
        None => println!("{}", "Not signed in; this chat is not saved".yellow()),
    }
    if let Some(conversation) = chat.conversation() {
        println!("Conversation: {} {}", conversation.title, conversation.id.dimmed());
    } else if !memory {
        println!("{}", "Memory is off".dimmed());
    }
    println!("{}\n", "Type /help for commands".dimmed());
}

fn print_help() {
    println!("{}", "Chat commands".bold());
    println!("  /attach <path>   Stage a file for the next message");
    println!("  /detach <n>      Remove staged file n");
    println!("  /files           Show staged files");
    println!("  /new             Start a new conversation");
    println!("  /list            List your conversations");
    println!("  /help            Show this help");
    println!("  /quit            Leave the chat");
    println!();
    println!("Press Enter on an empty line to send only the staged files.");
}

fn print_entry(entry: &TranscriptEntry) {
    let label = match entry.message.role {
        Role::User => "you".bold().blue(),
        Role::Model => "studymate".bold().cyan(),
    };
    println!("{}: {}", label, entry.message.content);
    if let Some(attachments) = &entry.message.attachments {
        for attachment in attachments {
            print_attachment(attachment);
        }
    }
    print_save_state(entry);
    println!();
}

fn print_attachment(attachment: &ChatAttachment) {
    let summary = format!(
        "  [{}] {} ({})",
        attachment.mime_type,
        attachment.name,
        format_size(attachment.size)
    );
    match &attachment.url {
        Some(url) => println!("{} {}", summary, url.dimmed()),
        None => println!("{} {}", summary, "(unavailable)".yellow()),
    }
}

fn print_save_state(entry: &TranscriptEntry) {
    if entry.save_state == SaveState::Unsaved {
        println!("{}", "  (not saved)".yellow());
    }
}
