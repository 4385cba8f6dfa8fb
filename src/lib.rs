//! StudyMate - study assistant client library
//!
//! Glues a hosted backend (auth, object storage, relational persistence)
//! and hosted generative models (text chat, live voice, images) into the
//! controllers a study assistant front end needs.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: sign-up / sign-in adapter, current user and change subscriptions
//! - `attachments`: staging, uploading and re-signing chat attachments
//! - `chat`: chat orchestration, transcript and title assignment
//! - `voice`: live voice session controller, PCM codec, playback and tools
//! - `image`: single-shot image generation
//! - `providers`: model service traits and the hosted implementations
//! - `storage`: persistence traits, records and the SQLite implementation
//! - `supabase`: REST adapters for the hosted backend
//! - `config`, `logging`, `error`, `cli`, `commands`: the ambient stack
//!
//! # Example
//!
//! ```no_run
//! use studymate::Config;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!     Ok(())
//! }
//! ```

pub mod attachments;
pub mod auth;
pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fakes;
pub mod image;
pub mod logging;
pub mod notify;
pub mod prompts;
pub mod providers;
pub mod storage;
pub mod supabase;
pub mod voice;

// Re-export commonly used types
pub use auth::{AuthAdapter, User};
pub use chat::{ChatMessage, ChatOrchestrator, Role, SaveState, TranscriptEntry};
pub use config::Config;
pub use error::{Result, StudymateError};
pub use image::{GeneratedImage, ImageGenerator};
pub use voice::{VoiceController, VoiceState};
