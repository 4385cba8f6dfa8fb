//! Persistence and object storage contracts
//!
//! Two seams live here: [`Database`] for conversations, messages and
//! profiles, and [`ObjectStorage`] for attachment bytes and signed URLs.
//! Hosted implementations are in [`crate::supabase`]; [`SqliteDatabase`]
//! keeps the same tables in a local file.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub mod sqlite;
pub mod types;

pub use sqlite::SqliteDatabase;
pub use types::{ConversationRecord, MessageRecord, NewMessage, Profile};

/// Relational persistence for chat history
///
/// Implementations must return messages in creation order (oldest first)
/// and conversations newest first.
#[async_trait]
pub trait Database: Send + Sync {
    /// Create a conversation owned by `user_id`
    async fn create_conversation(&self, user_id: &str, title: &str) -> Result<ConversationRecord>;

    /// List a user's conversations, newest first
    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationRecord>>;

    /// Fetch one conversation by id
    async fn get_conversation(&self, id: &str) -> Result<Option<ConversationRecord>>;

    /// Set the title only while the stored title still equals `expected`
    ///
    /// Returns `true` when a row was updated.
    async fn update_title_if(&self, id: &str, expected: &str, title: &str) -> Result<bool>;

    /// Append a chat turn
    async fn insert_message(&self, message: &NewMessage) -> Result<()>;

    /// List the turns of one conversation, oldest first
    async fn list_messages(&self, user_id: &str, conversation_id: &str)
        -> Result<Vec<MessageRecord>>;

    /// Insert or update a profile row
    async fn upsert_profile(&self, profile: &Profile) -> Result<()>;
}

/// Options applied to a single upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// `Cache-Control` max-age in seconds, as a string
    pub cache_control: String,
    /// Replace an existing object at the same path
    pub upsert: bool,
    /// MIME type of the uploaded bytes
    pub content_type: String,
}

impl UploadOptions {
    /// Options used for chat attachments: one hour cache, never overwrite
    pub fn attachment(content_type: impl Into<String>) -> Self {
        Self {
            cache_control: "3600".to_string(),
            upsert: false,
            content_type: content_type.into(),
        }
    }
}

/// Bucketed object storage with signed read URLs
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload raw bytes to `bucket/path`
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        options: &UploadOptions,
    ) -> Result<()>;

    /// Mint a URL granting read access to `bucket/path` for `ttl_seconds`
    async fn create_signed_url(&self, bucket: &str, path: &str, ttl_seconds: u64)
        -> Result<String>;
}
