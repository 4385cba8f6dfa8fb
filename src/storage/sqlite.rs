//! SQLite implementation of [`Database`]
//!
//! Mirrors the hosted tables (`conversations`, `messages`, `profiles`) in a
//! local file so the client can run offline and tests need no network.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

use super::{ConversationRecord, Database, MessageRecord, NewMessage, Profile};
use crate::attachments::PersistedAttachment;
use crate::chat::Role;
use crate::error::{Result, StudymateError};

/// Local conversation database
pub struct SqliteDatabase {
    db_path: PathBuf,
}

impl SqliteDatabase {
    /// Open the database in the user's data directory
    ///
    /// `STUDYMATE_HISTORY_DB` overrides the location.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var("STUDYMATE_HISTORY_DB") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "studymate", "studymate")
            .ok_or_else(|| StudymateError::Database("Could not determine data directory".into()))?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .context("Failed to create data directory")
            .map_err(|e| StudymateError::Database(e.to_string()))?;

        Self::new_with_path(data_dir.join("studymate.db"))
    }

    /// Open (and initialize) the database at `db_path`
    ///
    /// # Examples
    ///
    /// ```
    /// use studymate::storage::SqliteDatabase;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let db = SqliteDatabase::new_with_path(dir.path().join("chat.db")).unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| StudymateError::Database(e.to_string()))?;
        }

        let db = Self { db_path };
        db.init()?;
        Ok(db)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| StudymateError::Database(e.to_string()).into())
    }

    fn init(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                attachments JSON,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages (conversation_id, created_at);",
        )
        .context("Failed to create tables")
        .map_err(|e| StudymateError::Database(e.to_string()))?;

        Ok(())
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn conversation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRecord> {
    let created_at: String = row.get(3)?;
    Ok(ConversationRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_timestamp(&created_at),
    })
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn create_conversation(&self, user_id: &str, title: &str) -> Result<ConversationRecord> {
        let conn = self.open()?;
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = now_timestamp();

        conn.execute(
            "INSERT INTO conversations (id, user_id, title, created_at) VALUES (?, ?, ?, ?)",
            params![id, user_id, title, created_at],
        )
        .context("Failed to insert conversation")
        .map_err(|e| StudymateError::Database(e.to_string()))?;

        Ok(ConversationRecord {
            id,
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: parse_timestamp(&created_at),
        })
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationRecord>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, title, created_at FROM conversations
                WHERE user_id = ?
                ORDER BY created_at DESC, rowid DESC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| StudymateError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![user_id], conversation_from_row)
            .context("Failed to query conversations")
            .map_err(|e| StudymateError::Database(e.to_string()))?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row.map_err(|e| StudymateError::Database(e.to_string()))?);
        }
        Ok(conversations)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<ConversationRecord>> {
        let conn = self.open()?;
        conn.query_row(
            "SELECT id, user_id, title, created_at FROM conversations WHERE id = ?",
            params![id],
            conversation_from_row,
        )
        .optional()
        .context("Failed to query conversation")
        .map_err(|e| StudymateError::Database(e.to_string()).into())
    }

    async fn update_title_if(&self, id: &str, expected: &str, title: &str) -> Result<bool> {
        let conn = self.open()?;
        let updated = conn
            .execute(
                "UPDATE conversations SET title = ? WHERE id = ? AND title = ?",
                params![title, id, expected],
            )
            .context("Failed to update conversation title")
            .map_err(|e| StudymateError::Database(e.to_string()))?;
        Ok(updated > 0)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<()> {
        let conn = self.open()?;
        let attachments_json = match &message.attachments {
            Some(list) => Some(
                serde_json::to_string(list)
                    .context("Failed to serialize attachments")
                    .map_err(|e| StudymateError::Database(e.to_string()))?,
            ),
            None => None,
        };

        conn.execute(
            "INSERT INTO messages (user_id, conversation_id, role, content, attachments, created_at)
            VALUES (?, ?, ?, ?, ?, ?)",
            params![
                message.user_id,
                message.conversation_id,
                message.role.as_str(),
                message.content,
                attachments_json,
                now_timestamp()
            ],
        )
        .context("Failed to insert message")
        .map_err(|e| StudymateError::Database(e.to_string()))?;

        Ok(())
    }

    async fn list_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<MessageRecord>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, conversation_id, role, content, attachments, created_at
                FROM messages
                WHERE user_id = ? AND conversation_id = ?
                ORDER BY created_at ASC, id ASC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| StudymateError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![user_id, conversation_id], |row| {
                let role: String = row.get(2)?;
                let attachments: Option<String> = row.get(4)?;
                let created_at: String = row.get(5)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    role,
                    row.get::<_, String>(3)?,
                    attachments,
                    created_at,
                ))
            })
            .context("Failed to query messages")
            .map_err(|e| StudymateError::Database(e.to_string()))?;

        let mut messages = Vec::new();
        for row in rows {
            let (user_id, conversation_id, role, content, attachments, created_at) =
                row.map_err(|e| StudymateError::Database(e.to_string()))?;

            let role: Role = role
                .parse()
                .map_err(|e: String| StudymateError::Database(e))?;
            let attachments = match attachments {
                Some(json) => Some(
                    serde_json::from_str::<Vec<PersistedAttachment>>(&json)
                        .context("Failed to deserialize attachments")
                        .map_err(|e| StudymateError::Database(e.to_string()))?,
                ),
                None => None,
            };

            messages.push(MessageRecord {
                user_id,
                conversation_id,
                role,
                content,
                attachments,
                created_at: parse_timestamp(&created_at),
            });
        }

        Ok(messages)
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO profiles (id, display_name) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name",
            params![profile.id, profile.display_name],
        )
        .context("Failed to upsert profile")
        .map_err(|e| StudymateError::Database(e.to_string()))?;
        Ok(())
    }
}
