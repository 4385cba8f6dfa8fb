use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::attachments::ChatAttachment;

/// Author of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The student
    User,
    /// The assistant
    Model,
}

impl Role {
    /// Wire and column representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "model" => Ok(Role::Model),
            other => Err(format!("Unknown message role: {}", other)),
        }
    }
}

/// One displayed chat turn
///
/// # Examples
///
/// ```
/// use studymate::chat::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("What is osmosis?");
/// assert_eq!(msg.role, Role::User);
/// assert!(msg.attachments.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who authored the turn
    pub role: Role,
    /// Text of the turn
    pub content: String,
    /// Attachments in display form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<ChatAttachment>>,
}

impl ChatMessage {
    /// A user turn without attachments
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments: None,
        }
    }

    /// A model turn
    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
            attachments: None,
        }
    }

    /// Attach display attachments; an empty list leaves the field unset
    pub fn with_attachments(mut self, attachments: Vec<ChatAttachment>) -> Self {
        self.attachments = if attachments.is_empty() {
            None
        } else {
            Some(attachments)
        };
        self
    }
}

/// Persistence status of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveState {
    /// Not meant to be persisted (greeting, memory off, signed out)
    Local,
    /// Written to the database
    Saved,
    /// Persisting was attempted and failed
    Unsaved,
}

/// A message in the transcript plus its persistence status
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    /// The message itself; never changed after it is appended
    pub message: ChatMessage,
    /// Whether the message reached the database
    pub save_state: SaveState,
}

impl TranscriptEntry {
    pub(crate) fn local(message: ChatMessage) -> Self {
        Self {
            message,
            save_state: SaveState::Local,
        }
    }

    pub(crate) fn saved(message: ChatMessage) -> Self {
        Self {
            message,
            save_state: SaveState::Saved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_str() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("model".parse::<Role>().unwrap(), Role::Model);
        assert!("assistant".parse::<Role>().is_err());
        assert_eq!(Role::Model.to_string(), "model");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
    }

    #[test]
    fn test_with_empty_attachments_leaves_none() {
        let msg = ChatMessage::user("hi").with_attachments(Vec::new());
        assert!(msg.attachments.is_none());
    }
}
