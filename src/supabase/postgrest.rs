//! REST database endpoints

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;

use super::{error_for_response, SupabaseClient};
use crate::error::{Result, StudymateError};
use crate::storage::{ConversationRecord, Database, MessageRecord, NewMessage, Profile};

const CONVERSATIONS: &str = "/rest/v1/conversations";
const MESSAGES: &str = "/rest/v1/messages";
const PROFILES: &str = "/rest/v1/profiles";

#[derive(Serialize)]
struct NewConversation<'a> {
    user_id: &'a str,
    title: &'a str,
}

/// [`Database`] over the hosted REST interface
#[derive(Debug, Clone)]
pub struct PostgrestDatabase {
    client: SupabaseClient,
}

impl PostgrestDatabase {
    /// Adapter over `client`
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| StudymateError::Database(format!("request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(error_for_response("Database", response, StudymateError::Database).await.into());
        }
        response.json().await.map_err(|e| {
            StudymateError::Database(format!("Failed to parse database response: {}", e)).into()
        })
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<()> {
        let response = request
            .send()
            .await
            .map_err(|e| StudymateError::Database(format!("request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(error_for_response("Database", response, StudymateError::Database).await.into());
        }
        Ok(())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

#[async_trait]
impl Database for PostgrestDatabase {
    async fn create_conversation(&self, user_id: &str, title: &str) -> Result<ConversationRecord> {
        let rows: Vec<ConversationRecord> = self
            .fetch(
                self.client
                    .request(Method::POST, CONVERSATIONS)
                    .header("Prefer", "return=representation")
                    .json(&NewConversation { user_id, title }),
            )
            .await?;
        rows.into_iter().next().ok_or_else(|| {
            StudymateError::Database("conversation insert returned no row".to_string()).into()
        })
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationRecord>> {
        self.fetch(
            self.client
                .request(Method::GET, CONVERSATIONS)
                .query(&[
                    ("select", "*".to_string()),
                    ("user_id", eq(user_id)),
                    ("order", "created_at.desc".to_string()),
                ]),
        )
        .await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<ConversationRecord>> {
        let rows: Vec<ConversationRecord> = self
            .fetch(
                self.client
                    .request(Method::GET, CONVERSATIONS)
                    .query(&[("select", "*".to_string()), ("id", eq(id)), ("limit", "1".to_string())]),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update_title_if(&self, id: &str, expected: &str, title: &str) -> Result<bool> {
        let rows: Vec<ConversationRecord> = self
            .fetch(
                self.client
                    .request(Method::PATCH, CONVERSATIONS)
                    .query(&[("id", eq(id)), ("title", eq(expected))])
                    .header("Prefer", "return=representation")
                    .json(&serde_json::json!({ "title": title })),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<()> {
        self.execute(
            self.client
                .request(Method::POST, MESSAGES)
                .header("Prefer", "return=minimal")
                .json(message),
        )
        .await
    }

    async fn list_messages(&self, user_id: &str, conversation_id: &str) -> Result<Vec<MessageRecord>> {
        self.fetch(
            self.client.request(Method::GET, MESSAGES).query(&[
                ("select", "*".to_string()),
                ("user_id", eq(user_id)),
                ("conversation_id", eq(conversation_id)),
                ("order", "created_at.asc".to_string()),
            ]),
        )
        .await
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.execute(
            self.client
                .request(Method::POST, PROFILES)
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(profile),
        )
        .await
    }
}
