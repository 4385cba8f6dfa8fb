//! Command-line interface definition for StudyMate
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for authentication, chat and image generation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// StudyMate - study assistant for the terminal
///
/// Chat with a hosted model (optionally with file attachments and
/// persistent memory) and generate images from prompts.
#[derive(Parser, Debug, Clone)]
#[command(name = "studymate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit JSON log lines
    #[arg(long)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for StudyMate
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Manage the signed-in account
    Auth {
        /// Account subcommand
        #[command(subcommand)]
        command: AuthCommand,
    },

    /// Start an interactive chat session
    Chat {
        /// Resume a conversation by id instead of the most recent one
        #[arg(long)]
        conversation: Option<String>,

        /// Do not load or persist history for this session
        #[arg(long)]
        no_memory: bool,
    },

    /// Generate a single image from a prompt
    Image {
        /// Description of the image
        #[arg(short, long)]
        prompt: String,

        /// Aspect ratio: 1:1, 3:4, 4:3, 9:16 or 16:9
        #[arg(short, long, default_value = "1:1")]
        aspect_ratio: String,

        /// Write the decoded image to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List conversations of the signed-in user
    Conversations,
}

/// Account subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommand {
    /// Create an account
    Signup {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password
        #[arg(short, long, env = "STUDYMATE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign in to an existing account
    Signin {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password
        #[arg(short, long, env = "STUDYMATE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the cached session
    Signout,

    /// Show the signed-in user
    Whoami,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            command: Commands::Auth {
                command: AuthCommand::Whoami,
            },
        }
    }
}
