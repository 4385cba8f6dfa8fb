//! Configuration management for StudyMate
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, StudymateError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for StudyMate
///
/// Holds the backend (auth, storage, persistence) settings, the hosted
/// model settings, and the behavior of the chat and voice controllers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend-as-a-service settings
    #[serde(default)]
    pub backend: BackendConfig,
    /// Hosted generative model settings
    #[serde(default)]
    pub genai: GenaiConfig,
    /// Chat orchestration settings
    #[serde(default)]
    pub chat: ChatConfig,
    /// Voice session settings
    #[serde(default)]
    pub voice: VoiceConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which persistence backend stores conversations and messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    /// Hosted PostgREST tables next to the auth service
    #[default]
    Supabase,
    /// Local SQLite file, useful offline and in tests
    Sqlite,
}

/// Backend-as-a-service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Project base URL (e.g. `https://abc.supabase.co`)
    #[serde(default)]
    pub url: String,

    /// Public anonymous API key
    #[serde(default)]
    pub anon_key: String,

    /// Bucket that receives chat attachments
    #[serde(default = "default_attachments_bucket")]
    pub attachments_bucket: String,

    /// Validity window of minted attachment URLs (seconds)
    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl_seconds: u64,

    /// Persistence backend for conversations and messages
    #[serde(default)]
    pub database: DatabaseKind,

    /// SQLite file used when `database` is `sqlite`
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,

    /// Cache the signed-in session in the OS keyring
    #[serde(default = "default_remember_session")]
    pub remember_session: bool,
}

fn default_attachments_bucket() -> String {
    "chat-attachments".to_string()
}

fn default_signed_url_ttl() -> u64 {
    24 * 60 * 60
}

fn default_remember_session() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            attachments_bucket: default_attachments_bucket(),
            signed_url_ttl_seconds: default_signed_url_ttl(),
            database: DatabaseKind::default(),
            sqlite_path: None,
            remember_session: default_remember_session(),
        }
    }
}

/// Hosted generative model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenaiConfig {
    /// API key for the model service
    #[serde(default)]
    pub api_key: String,

    /// REST base URL (overridable for tests and local mocks)
    #[serde(default = "default_genai_api_base")]
    pub api_base: String,

    /// WebSocket endpoint of the live audio service
    #[serde(default = "default_live_url")]
    pub live_url: String,

    /// Model used for text chat
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model used for image generation
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Model used for the live voice session
    #[serde(default = "default_live_model")]
    pub live_model: String,
}

fn default_genai_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_live_url() -> String {
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string()
}

fn default_chat_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_image_model() -> String {
    "imagen-4.0-generate-001".to_string()
}

fn default_live_model() -> String {
    "gemini-2.5-flash-native-audio-preview-09-2025".to_string()
}

impl Default for GenaiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_genai_api_base(),
            live_url: default_live_url(),
            chat_model: default_chat_model(),
            image_model: default_image_model(),
            live_model: default_live_model(),
        }
    }
}

/// Chat orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Persist and reload conversation history for signed-in users
    #[serde(default = "default_memory_enabled")]
    pub memory_enabled: bool,

    /// Title given to freshly created conversations
    #[serde(default = "default_title")]
    pub default_title: String,
}

fn default_memory_enabled() -> bool {
    true
}

fn default_title() -> String {
    "New Chat".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            memory_enabled: default_memory_enabled(),
            default_title: default_title(),
        }
    }
}

/// Voice session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Capture sample rate sent to the live service (Hz)
    #[serde(default = "default_input_sample_rate")]
    pub input_sample_rate: u32,

    /// Sample rate of audio returned by the live service (Hz)
    #[serde(default = "default_output_sample_rate")]
    pub output_sample_rate: u32,

    /// How long transient notifications stay visible (milliseconds)
    #[serde(default = "default_notification_ttl_ms")]
    pub notification_ttl_ms: u64,

    /// Maximum queued outbound audio frames before new frames are dropped
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
}

fn default_input_sample_rate() -> u32 {
    16_000
}

fn default_output_sample_rate() -> u32 {
    24_000
}

fn default_notification_ttl_ms() -> u64 {
    3_000
}

fn default_outbound_queue_capacity() -> usize {
    64
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: default_input_sample_rate(),
            output_sample_rate: default_output_sample_rate(),
            notification_ttl_ms: default_notification_ttl_ms(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON-formatted log lines
    #[serde(default)]
    pub json_format: bool,

    /// Optional file that receives a copy of every log line
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "studymate=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StudymateError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| StudymateError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("STUDYMATE_BACKEND_URL") {
            self.backend.url = url;
        }

        if let Ok(key) = std::env::var("STUDYMATE_BACKEND_ANON_KEY") {
            self.backend.anon_key = key;
        }

        if let Ok(bucket) = std::env::var("STUDYMATE_ATTACHMENTS_BUCKET") {
            self.backend.attachments_bucket = bucket;
        }

        if let Ok(database) = std::env::var("STUDYMATE_DATABASE") {
            match database.to_lowercase().as_str() {
                "supabase" => self.backend.database = DatabaseKind::Supabase,
                "sqlite" => self.backend.database = DatabaseKind::Sqlite,
                _ => tracing::warn!("Invalid STUDYMATE_DATABASE: {}", database),
            }
        }

        if let Ok(path) = std::env::var("STUDYMATE_SQLITE_PATH") {
            self.backend.sqlite_path = Some(PathBuf::from(path));
        }

        if let Ok(api_key) = std::env::var("STUDYMATE_GENAI_API_KEY") {
            self.genai.api_key = api_key;
        }

        if let Ok(api_base) = std::env::var("STUDYMATE_GENAI_API_BASE") {
            self.genai.api_base = api_base;
        }

        if let Ok(model) = std::env::var("STUDYMATE_CHAT_MODEL") {
            self.genai.chat_model = model;
        }

        if let Ok(model) = std::env::var("STUDYMATE_IMAGE_MODEL") {
            self.genai.image_model = model;
        }

        if let Ok(model) = std::env::var("STUDYMATE_LIVE_MODEL") {
            self.genai.live_model = model;
        }

        if let Ok(memory) = std::env::var("STUDYMATE_MEMORY") {
            match memory.parse::<bool>() {
                Ok(v) => {
                    self.chat.memory_enabled = v;
                    tracing::debug!(memory_enabled = v, "Env override: STUDYMATE_MEMORY");
                }
                Err(_) => tracing::warn!("Invalid value for STUDYMATE_MEMORY: {}", memory),
            }
        }

        if let Ok(level) = std::env::var("STUDYMATE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(json_logs) = std::env::var("STUDYMATE_JSON_LOGS") {
            match json_logs.parse::<bool>() {
                Ok(v) => self.logging.json_format = v,
                Err(_) => tracing::warn!("Invalid value for STUDYMATE_JSON_LOGS: {}", json_logs),
            }
        }

        if let Ok(log_file) = std::env::var("STUDYMATE_LOG_FILE") {
            self.logging.file_path = Some(PathBuf::from(log_file));
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            self.logging.level = "studymate=debug".to_string();
        }

        if cli.json_logs {
            self.logging.json_format = true;
        }

        if let crate::cli::Commands::Chat {
            no_memory: true, ..
        } = cli.command
        {
            self.chat.memory_enabled = false;
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if !self.backend.url.is_empty() {
            url::Url::parse(&self.backend.url).map_err(|e| {
                StudymateError::Config(format!("backend.url is not a valid URL: {}", e))
            })?;
        }

        if self.backend.attachments_bucket.trim().is_empty() {
            return Err(StudymateError::Config(
                "backend.attachments_bucket cannot be empty".to_string(),
            )
            .into());
        }

        if self.backend.signed_url_ttl_seconds == 0 {
            return Err(StudymateError::Config(
                "backend.signed_url_ttl_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.default_title.trim().is_empty() {
            return Err(
                StudymateError::Config("chat.default_title cannot be empty".to_string()).into(),
            );
        }

        if self.voice.input_sample_rate == 0 || self.voice.output_sample_rate == 0 {
            return Err(StudymateError::Config(
                "voice sample rates must be greater than 0".to_string(),
            )
            .into());
        }

        if self.voice.outbound_queue_capacity == 0 {
            return Err(StudymateError::Config(
                "voice.outbound_queue_capacity must be greater than 0".to_string(),
            )
            .into());
        }

        for (name, model) in [
            ("genai.chat_model", &self.genai.chat_model),
            ("genai.image_model", &self.genai.image_model),
            ("genai.live_model", &self.genai.live_model),
        ] {
            if model.trim().is_empty() {
                return Err(StudymateError::Config(format!("{} cannot be empty", name)).into());
            }
        }

        Ok(())
    }

    /// Fails with a configuration error unless the backend is reachable
    /// by URL and key.
    pub fn require_backend(&self) -> Result<()> {
        if self.backend.url.is_empty() || self.backend.anon_key.is_empty() {
            return Err(StudymateError::Config(
                "backend.url and backend.anon_key must be set (or STUDYMATE_BACKEND_URL / STUDYMATE_BACKEND_ANON_KEY)".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Fails with a configuration error unless a model API key is set.
    pub fn require_genai(&self) -> Result<()> {
        if self.genai.api_key.is_empty() {
            return Err(StudymateError::Config(
                "genai.api_key must be set (or STUDYMATE_GENAI_API_KEY)".to_string(),
            )
            .into());
        }
        Ok(())
    }
}
