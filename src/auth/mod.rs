//! Authentication adapter
//!
//! [`AuthAdapter`] wraps an [`AuthProvider`] (the hosted auth service) and a
//! [`Database`] for profile rows. It owns the locally known [`User`] and
//! fans out change notifications to subscribers after every state-changing
//! call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use crate::error::{Result, StudymateError};
use crate::storage::{Database, Profile};

pub mod session_store;

pub use session_store::{AuthSession, SessionStore};

/// A signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Id assigned by the auth service
    pub id: String,
    /// Login email
    pub email: String,
    /// Name chosen at sign-up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl User {
    /// Name to greet the user with, falling back to the email local part
    pub fn greeting_name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.email.split('@').next().unwrap_or(&self.email),
        }
    }
}

/// Hosted authentication service
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Register an account; `metadata` is stored with the user record
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<Option<User>>;

    /// Exchange credentials for a session
    async fn sign_in(&self, email: &str, password: &str) -> Result<Option<User>>;

    /// End the current session
    async fn sign_out(&self) -> Result<()>;

    /// Look up the user of the current session
    async fn get_user(&self) -> Result<Option<User>>;
}

type AuthHandler = Arc<dyn Fn(Option<&User>) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    handlers: Vec<(u64, AuthHandler)>,
}

/// Handle returned by [`AuthAdapter::on_auth_change`]
///
/// The handler stays registered until [`AuthSubscription::unsubscribe`] is
/// called or the handle is dropped.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct AuthSubscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl AuthSubscription {
    /// Stop receiving notifications
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            let mut guard = listeners.lock().unwrap_or_else(PoisonError::into_inner);
            guard.handlers.retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for AuthSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSubscription").field("id", &self.id).finish()
    }
}

/// Sign-up, sign-in and current-user tracking over an [`AuthProvider`]
pub struct AuthAdapter {
    provider: Arc<dyn AuthProvider>,
    db: Arc<dyn Database>,
    current: RwLock<Option<User>>,
    listeners: Arc<Mutex<Listeners>>,
}

impl AuthAdapter {
    /// Create an adapter with no known user
    pub fn new(provider: Arc<dyn AuthProvider>, db: Arc<dyn Database>) -> Self {
        Self {
            provider,
            db,
            current: RwLock::new(None),
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    /// Register an account and write its profile row
    ///
    /// The profile write happens after the account exists upstream; if it
    /// fails the whole call fails and no local user is recorded.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank fields, the provider's error,
    /// [`StudymateError::Authentication`] when no user comes back, or the
    /// profile write error.
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<User> {
        let name = name.trim();
        require_field("name", name)?;
        require_field("email", email)?;
        require_field("password", password)?;

        let metadata = serde_json::json!({ "display_name": name });
        let mut user = self
            .provider
            .sign_up(email, password, metadata)
            .await?
            .ok_or_else(|| {
                StudymateError::Authentication("sign-up returned no user".to_string())
            })?;
        if user.display_name.is_none() {
            user.display_name = Some(name.to_string());
        }

        self.db
            .upsert_profile(&Profile {
                id: user.id.clone(),
                display_name: name.to_string(),
            })
            .await?;

        tracing::info!(user_id = %user.id, "Signed up");
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    /// Sign in with email and password
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank fields, the provider's error, or
    /// [`StudymateError::Authentication`] when no user comes back.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        require_field("email", email)?;
        require_field("password", password)?;

        let user = self
            .provider
            .sign_in(email, password)
            .await?
            .ok_or_else(|| {
                StudymateError::Authentication("sign-in returned no user".to_string())
            })?;

        tracing::info!(user_id = %user.id, "Signed in");
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    /// Sign out
    ///
    /// The local user is cleared even when the provider call fails; the
    /// provider error is still returned.
    pub async fn sign_out(&self) -> Result<()> {
        let outcome = self.provider.sign_out().await;
        self.set_current(None);
        tracing::info!("Signed out");
        outcome
    }

    /// Ask the provider for the current user
    ///
    /// Never fails: any retrieval error resolves to `None`.
    pub async fn current_user(&self) -> Option<User> {
        match self.provider.get_user().await {
            Ok(user) => {
                if self.cached_user() != user {
                    self.set_current(user.clone());
                }
                user
            }
            Err(e) => {
                tracing::warn!("Failed to look up current user: {}", e);
                None
            }
        }
    }

    /// Last user seen by this adapter, without a provider round trip
    pub fn cached_user(&self) -> Option<User> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Subscribe to user changes
    ///
    /// The handler receives a snapshot after every sign-up, sign-in,
    /// sign-out or observed change of the current user.
    pub fn on_auth_change<F>(&self, handler: F) -> AuthSubscription
    where
        F: Fn(Option<&User>) + Send + Sync + 'static,
    {
        let mut guard = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        guard.next_id += 1;
        let id = guard.next_id;
        guard.handlers.push((id, Arc::new(handler)));
        AuthSubscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }

    fn set_current(&self, user: Option<User>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = user.clone();

        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<AuthHandler> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(user.as_ref());
        }
    }
}

fn require_field(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StudymateError::Validation(format!("{} is required", field)).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeAuthProvider, MemoryDatabase};

    fn adapter() -> (AuthAdapter, Arc<FakeAuthProvider>, Arc<MemoryDatabase>) {
        let provider = Arc::new(FakeAuthProvider::new());
        let db = Arc::new(MemoryDatabase::new());
        (
            AuthAdapter::new(provider.clone(), db.clone()),
            provider,
            db,
        )
    }

    #[tokio::test]
    async fn test_sign_up_writes_profile_and_sets_user() {
        let (auth, _, db) = adapter();
        let user = auth.sign_up("Ada", "ada@example.com", "secret").await.unwrap();

        assert_eq!(user.display_name.as_deref(), Some("Ada"));
        assert_eq!(auth.cached_user(), Some(user.clone()));
        assert_eq!(db.profile(&user.id).unwrap().display_name, "Ada");
    }

    #[tokio::test]
    async fn test_sign_up_provider_error_leaves_no_user() {
        let (auth, provider, db) = adapter();
        provider.set_failure(Some("Email rate limit exceeded"));

        let err = auth.sign_up("Ada", "ada@example.com", "secret").await.unwrap_err();
        assert!(err.to_string().contains("Email rate limit exceeded"));
        assert!(auth.cached_user().is_none());
        assert_eq!(db.profile_count(), 0);
    }

    #[tokio::test]
    async fn test_sign_up_without_user_fails() {
        let (auth, provider, _) = adapter();
        provider.set_returns_no_user(true);

        let err = auth.sign_up("Ada", "ada@example.com", "secret").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StudymateError>(),
            Some(StudymateError::Authentication(_))
        ));
        assert!(auth.cached_user().is_none());
    }

    #[tokio::test]
    async fn test_sign_up_profile_failure_fails_call() {
        let (auth, provider, db) = adapter();
        db.set_profile_upserts_fail(true);

        assert!(auth.sign_up("Ada", "ada@example.com", "secret").await.is_err());
        assert!(auth.cached_user().is_none());
        // The upstream account exists regardless
        assert!(provider.has_account("ada@example.com"));
    }

    #[tokio::test]
    async fn test_sign_up_rejects_blank_fields() {
        let (auth, provider, _) = adapter();
        assert!(auth.sign_up("  ", "a@b.c", "pw").await.is_err());
        assert!(auth.sign_up("Ada", "", "pw").await.is_err());
        assert!(!provider.has_account("a@b.c"));
    }

    #[tokio::test]
    async fn test_sign_in_wrong_password_fails() {
        let (auth, provider, _) = adapter();
        provider.add_account("ada@example.com", "secret", Some("Ada"));

        assert!(auth.sign_in("ada@example.com", "nope").await.is_err());
        assert!(auth.cached_user().is_none());

        let user = auth.sign_in("ada@example.com", "secret").await.unwrap();
        assert_eq!(user.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_current_user_never_fails() {
        let (auth, provider, _) = adapter();
        provider.set_failure(Some("network down"));
        assert!(auth.current_user().await.is_none());
    }

    #[tokio::test]
    async fn test_subscription_receives_changes_until_dropped() {
        let (auth, provider, _) = adapter();
        provider.add_account("ada@example.com", "secret", Some("Ada"));

        let seen = Arc::new(Mutex::new(Vec::<Option<String>>::new()));
        let sink = seen.clone();
        let subscription = auth.on_auth_change(move |user| {
            sink.lock().unwrap().push(user.map(|u| u.email.clone()));
        });
        assert_eq!(auth.subscriber_count(), 1);

        auth.sign_in("ada@example.com", "secret").await.unwrap();
        auth.sign_out().await.unwrap();
        subscription.unsubscribe();
        auth.sign_in("ada@example.com", "secret").await.unwrap();

        assert_eq!(auth.subscriber_count(), 0);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("ada@example.com".to_string()), None]
        );
    }

    #[test]
    fn test_greeting_name_falls_back_to_email() {
        let user = User {
            id: "1".into(),
            email: "sam@example.com".into(),
            display_name: None,
        };
        assert_eq!(user.greeting_name(), "sam");
    }
}
