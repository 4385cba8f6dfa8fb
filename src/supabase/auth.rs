//! GoTrue auth endpoints

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;

use super::{error_for_response, SupabaseClient};
use crate::auth::{AuthProvider, AuthSession, SessionStore, User};
use crate::error::{Result, StudymateError};

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

impl From<GoTrueUser> for User {
    fn from(user: GoTrueUser) -> Self {
        let display_name = user
            .user_metadata
            .get("display_name")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        User {
            id: user.id,
            email: user.email.unwrap_or_default(),
            display_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoTrueSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: GoTrueUser,
}

impl GoTrueSession {
    fn into_session(self) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            });
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into(),
        }
    }
}

/// Auth adapter for the hosted GoTrue service
///
/// Sessions are kept on the shared [`SupabaseClient`] and, when a
/// [`SessionStore`] is attached, in the OS keyring.
#[derive(Debug, Clone)]
pub struct SupabaseAuth {
    client: SupabaseClient,
    store: Option<SessionStore>,
}

impl SupabaseAuth {
    /// Adapter without session persistence
    pub fn new(client: SupabaseClient) -> Self {
        Self {
            client,
            store: None,
        }
    }

    /// Persist sessions in `store`
    pub fn with_session_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Load a persisted session into the client, dropping expired ones
    pub fn restore_session(&self) -> Result<Option<AuthSession>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        match store.load()? {
            Some(session) if !session.is_expired() => {
                self.client.set_session(Some(session.clone()));
                Ok(Some(session))
            }
            Some(_) => {
                tracing::info!("Stored session expired");
                store.clear()?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn remember(&self, session: AuthSession) -> User {
        let user = session.user.clone();
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&session) {
                tracing::warn!("Failed to persist session: {}", e);
            }
        }
        self.client.set_session(Some(session));
        user
    }

    fn forget(&self) {
        self.client.set_session(None);
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                tracing::warn!("Failed to clear stored session: {}", e);
            }
        }
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<Option<User>> {
        let response = self
            .client
            .request(Method::POST, "/auth/v1/signup")
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": metadata,
            }))
            .send()
            .await
            .map_err(|e| StudymateError::Authentication(format!("sign-up request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(error_for_response("Auth", response, StudymateError::Authentication).await.into());
        }

        // With email confirmation off the response is a session; otherwise
        // it is the bare user.
        let body: serde_json::Value = response.json().await?;
        if body.get("access_token").is_some() {
            let session: GoTrueSession = serde_json::from_value(body)?;
            return Ok(Some(self.remember(session.into_session())));
        }
        let user_value = match body.get("user") {
            Some(user) if !user.is_null() => user.clone(),
            _ => body,
        };
        if user_value.get("id").is_none() {
            return Ok(None);
        }
        let user: GoTrueUser = serde_json::from_value(user_value)?;
        Ok(Some(user.into()))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Option<User>> {
        let response = self
            .client
            .request(Method::POST, "/auth/v1/token?grant_type=password")
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| StudymateError::Authentication(format!("sign-in request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(error_for_response("Auth", response, StudymateError::Authentication).await.into());
        }

        let session: GoTrueSession = response.json().await?;
        Ok(Some(self.remember(session.into_session())))
    }

    async fn sign_out(&self) -> Result<()> {
        if self.client.session().is_none() {
            self.forget();
            return Ok(());
        }
        let outcome = self
            .client
            .request(Method::POST, "/auth/v1/logout")
            .send()
            .await;
        self.forget();

        let response = outcome
            .map_err(|e| StudymateError::Authentication(format!("sign-out request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(error_for_response("Auth", response, StudymateError::Authentication).await.into());
        }
        Ok(())
    }

    async fn get_user(&self) -> Result<Option<User>> {
        if self.client.session().is_none() {
            return Ok(None);
        }
        let response = self
            .client
            .request(Method::GET, "/auth/v1/user")
            .send()
            .await
            .map_err(|e| StudymateError::Authentication(format!("user lookup failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(error_for_response("Auth", response, StudymateError::Authentication).await.into());
        }
        let user: GoTrueUser = response.json().await?;
        Ok(Some(user.into()))
    }
}
