//! StudyMate - study assistant CLI
//!
//! Main entry point for the StudyMate application.

use anyhow::Result;

use studymate::cli::{Cli, Commands};
use studymate::commands;
use studymate::config::Config;
use studymate::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Initialize logging from the resolved configuration
    init_logging(&config.logging)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Auth { command } => {
            tracing::info!("Starting account command");
            commands::auth::handle_auth(config, command).await?;
            Ok(())
        }
        Commands::Chat { conversation, .. } => {
            if let Some(id) = &conversation {
                tracing::debug!("Resuming conversation: {}", id);
            }
            commands::chat::run_chat(config, conversation).await?;
            Ok(())
        }
        Commands::Image {
            prompt,
            aspect_ratio,
            output,
        } => {
            tracing::info!("Starting image generation");
            commands::image::run_image(config, prompt, aspect_ratio, output).await?;
            Ok(())
        }
        Commands::Conversations => {
            commands::conversations::list_conversations(config).await?;
            Ok(())
        }
    }
}
