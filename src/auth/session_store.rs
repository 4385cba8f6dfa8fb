//! Auth session persistence via OS keyring
//!
//! The CLI runs one command per process, so the access token obtained by
//! `auth signin` is kept in the operating system's credential store and
//! picked up again by later invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::User;
use crate::error::{Result, StudymateError};

/// A session issued by the auth service
///
/// # Examples
///
/// ```
/// use studymate::auth::{AuthSession, User};
///
/// let session = AuthSession {
///     access_token: "token".to_string(),
///     refresh_token: None,
///     expires_at: None,
///     user: User { id: "u1".into(), email: "a@b.c".into(), display_name: None },
/// };
/// assert!(!session.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer token for authenticated requests
    pub access_token: String,
    /// Token for obtaining a new access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    /// The signed-in user
    pub user: User,
}

impl AuthSession {
    /// Whether the access token is expired, with a 60 second margin
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => Utc::now() >= expires_at - chrono::Duration::seconds(60),
        }
    }
}

/// Keyring accessor for one backend
///
/// Sessions are stored under a service name derived from the backend URL so
/// that two projects never share credentials.
#[derive(Debug, Clone)]
pub struct SessionStore {
    backend: String,
}

impl SessionStore {
    /// Store for the backend at `backend_url`
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend: backend_url.into(),
        }
    }

    fn service_name(&self) -> String {
        let host = url::Url::parse(&self.backend)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.backend.clone());
        format!("studymate-{}", host)
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service_name(), "session")
            .map_err(|e| StudymateError::Keyring(e).into())
    }

    /// Persist `session`
    pub fn save(&self, session: &AuthSession) -> Result<()> {
        let json_str = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&json_str)
            .map_err(StudymateError::Keyring)?;
        Ok(())
    }

    /// Load the stored session, `None` when nothing was saved
    pub fn load(&self) -> Result<Option<AuthSession>> {
        match self.entry()?.get_password() {
            Ok(json_str) => Ok(Some(serde_json::from_str(&json_str)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StudymateError::Keyring(e).into()),
        }
    }

    /// Remove the stored session; a missing entry is not an error
    pub fn clear(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StudymateError::Keyring(e).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_at: Option<DateTime<Utc>>) -> AuthSession {
        AuthSession {
            access_token: "tok".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at,
            user: User {
                id: "u1".to_string(),
                email: "a@b.c".to_string(),
                display_name: Some("Ada".to_string()),
            },
        }
    }

    #[test]
    fn test_session_expiry_margin() {
        assert!(session(Some(Utc::now() - Duration::seconds(1))).is_expired());
        assert!(session(Some(Utc::now() + Duration::seconds(30))).is_expired());
        assert!(!session(Some(Utc::now() + Duration::hours(1))).is_expired());
        assert!(!session(None).is_expired());
    }

    #[test]
    fn test_session_json_keeps_user() {
        let original = session(DateTime::from_timestamp(1_800_000_000, 0));
        let json = serde_json::to_string(&original).unwrap();
        let restored: AuthSession = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_service_name_uses_backend_host() {
        let store = SessionStore::new("https://abc.supabase.co");
        assert_eq!(store.service_name(), "studymate-abc.supabase.co");

        let store = SessionStore::new("not a url");
        assert_eq!(store.service_name(), "studymate-not a url");
    }
}
