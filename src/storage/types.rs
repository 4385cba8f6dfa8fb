use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attachments::PersistedAttachment;
use crate::chat::Role;

/// A stored conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Unique identifier for the conversation
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Display title
    pub title: String,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
}

/// A stored chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Owning user
    pub user_id: String,
    /// Conversation the turn belongs to
    pub conversation_id: String,
    /// Who authored the turn
    pub role: Role,
    /// Text of the turn
    pub content: String,
    /// Attachments in their persisted (storage path) form
    #[serde(default)]
    pub attachments: Option<Vec<PersistedAttachment>>,
    /// When the turn was written
    pub created_at: DateTime<Utc>,
}

/// A chat turn about to be written
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMessage {
    /// Owning user
    pub user_id: String,
    /// Conversation the turn belongs to
    pub conversation_id: String,
    /// Who authored the turn
    pub role: Role,
    /// Text of the turn
    pub content: String,
    /// Attachments in their persisted (storage path) form
    pub attachments: Option<Vec<PersistedAttachment>>,
}

/// Public profile row keyed by user id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// User id from the auth service
    pub id: String,
    /// Name shown in greetings and instructions
    pub display_name: String,
}
