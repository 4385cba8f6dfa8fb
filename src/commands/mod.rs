/*!
Command handlers for the CLI

Each subcommand of the binary maps to one handler here:

- `auth`          account sign-up, sign-in, sign-out and whoami
- `chat`          interactive chat with attachments and memory
- `image`         one-shot image generation
- `conversations` list the signed-in user's conversations

Handlers assemble the library components from [`Config`] and print
results; they hold no logic of their own beyond presentation.
*/

use std::sync::Arc;

use crate::auth::{AuthAdapter, AuthProvider, SessionStore};
use crate::config::{Config, DatabaseKind};
use crate::error::Result;
use crate::storage::{Database, ObjectStorage, SqliteDatabase};
use crate::supabase::SupabaseClient;

pub mod chat;

/// Backend services shared by the commands
pub struct Backend {
    /// Auth adapter tracking the signed-in user
    pub auth: AuthAdapter,
    /// Conversation and message persistence
    pub db: Arc<dyn Database>,
    /// Attachment object storage
    pub storage: Arc<dyn ObjectStorage>,
}

/// Build the backend services described by `config`
///
/// When `backend.remember_session` is set, a session cached by an earlier
/// invocation is restored into the client before anything else runs.
///
/// # Errors
///
/// Returns a configuration error when the backend URL or key is missing,
/// or the error opening the local database.
pub fn connect_backend(config: &Config) -> Result<Backend> {
    config.require_backend()?;
    let client = SupabaseClient::from_config(&config.backend)?;

    let mut gotrue = client.auth();
    if config.backend.remember_session {
        gotrue = gotrue.with_session_store(SessionStore::new(config.backend.url.clone()));
        match gotrue.restore_session() {
            Ok(Some(_)) => tracing::debug!("Restored cached session"),
            Ok(None) => {}
            Err(e) => tracing::warn!("Could not restore cached session: {}", e),
        }
    }

    let db: Arc<dyn Database> = match config.backend.database {
        DatabaseKind::Supabase => Arc::new(client.database()),
        DatabaseKind::Sqlite => match &config.backend.sqlite_path {
            Some(path) => Arc::new(SqliteDatabase::new_with_path(path.clone())?),
            None => Arc::new(SqliteDatabase::new()?),
        },
    };
    let provider: Arc<dyn AuthProvider> = Arc::new(gotrue);

    Ok(Backend {
        auth: AuthAdapter::new(provider, db.clone()),
        db,
        storage: Arc::new(client.storage()),
    })
}

// Account command handler
pub mod auth {
    //! Account commands
    //!
    //! Sessions are cached in the OS keyring by the backend adapter, so a
    //! sign-in here is visible to later `chat` invocations.

    use super::*;
    use crate::cli::AuthCommand;
    use colored::Colorize;

    /// Run one account subcommand
    pub async fn handle_auth(config: Config, command: AuthCommand) -> Result<()> {
        let backend = connect_backend(&config)?;
        let auth = &backend.auth;

        match command {
            AuthCommand::Signup {
                name,
                email,
                password,
            } => {
                let user = auth.sign_up(&name, &email, &password).await?;
                println!(
                    "{} {} ({})",
                    "Signed up as".green(),
                    user.greeting_name().bold(),
                    user.email
                );
            }
            AuthCommand::Signin { email, password } => {
                let user = auth.sign_in(&email, &password).await?;
                println!("{} {}", "Signed in as".green(), user.email.bold());
            }
            AuthCommand::Signout => {
                auth.sign_out().await?;
                println!("{}", "Signed out".green());
            }
            AuthCommand::Whoami => match auth.current_user().await {
                Some(user) => {
                    println!("{} ({})", user.greeting_name().bold(), user.email);
                    println!("{}", format!("id: {}", user.id).dimmed());
                }
                None => println!("{}", "Not signed in".yellow()),
            },
        }
        Ok(())
    }
}

// Image generation handler
pub mod image {
    //! One-shot image generation

    use super::*;
    use crate::error::StudymateError;
    use crate::image::ImageGenerator;
    use crate::providers::{AspectRatio, GeminiClient};
    use colored::Colorize;
    use std::path::PathBuf;

    /// Generate one image and optionally write it to `output`
    pub async fn run_image(
        config: Config,
        prompt: String,
        aspect_ratio: String,
        output: Option<PathBuf>,
    ) -> Result<()> {
        config.require_genai()?;
        let aspect_ratio: AspectRatio = aspect_ratio.parse().map_err(StudymateError::Validation)?;
        let client = Arc::new(GeminiClient::from_config(&config.genai)?);
        let generator = ImageGenerator::new(client, config.genai.image_model.clone());

        let image = generator.generate(&prompt, aspect_ratio).await?;
        let size = match image.dimensions {
            Some((w, h)) => format!("{}x{}", w, h),
            None => "unknown size".to_string(),
        };

        match output {
            Some(path) => {
                tokio::fs::write(&path, &image.bytes).await?;
                println!(
                    "{} {} ({}, {})",
                    "Saved image to".green(),
                    path.display(),
                    image.mime_type,
                    size
                );
            }
            None => {
                println!(
                    "Generated {} image ({}, {} bytes)",
                    image.mime_type,
                    size,
                    image.bytes.len()
                );
                println!("{}", "Pass --output FILE to save it".dimmed());
            }
        }
        Ok(())
    }
}

// Conversation listing handler
pub mod conversations {
    //! Conversation listing

    use super::*;
    use crate::error::StudymateError;
    use colored::Colorize;

    /// Print the signed-in user's conversations, newest first
    pub async fn list_conversations(config: Config) -> Result<()> {
        let backend = connect_backend(&config)?;
        let user = backend.auth.current_user().await.ok_or_else(|| {
            StudymateError::Unauthorized("sign in to list conversations".to_string())
        })?;

        let conversations = backend.db.list_conversations(&user.id).await?;
        if conversations.is_empty() {
            println!("{}", "No conversations yet".yellow());
            return Ok(());
        }

        println!("{:<38} {:<17} {}", "ID".bold(), "CREATED".bold(), "TITLE".bold());
        for conversation in conversations {
            println!(
                "{:<38} {:<17} {}",
                conversation.id,
                conversation.created_at.format("%Y-%m-%d %H:%M"),
                conversation.title
            );
        }
        Ok(())
    }
}
