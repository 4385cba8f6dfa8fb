//! Hosted backend adapters
//!
//! One [`SupabaseClient`] holds the HTTP client, project URL, anon key and
//! the current auth session. The auth, storage and database adapters share
//! it so requests made after sign-in carry the user's bearer token.

use reqwest::{Client, Method, RequestBuilder};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::auth::AuthSession;
use crate::config::BackendConfig;
use crate::error::{Result, StudymateError};

pub mod auth;
pub mod objects;
pub mod postgrest;

pub use auth::SupabaseAuth;
pub use objects::SupabaseStorage;
pub use postgrest::PostgrestDatabase;

struct Inner {
    http: Client,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<AuthSession>>,
}

/// Shared connection to one backend project
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<Inner>,
}

impl SupabaseClient {
    /// Connect to the project at `base_url` with its public anon key
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the URL is empty or the HTTP
    /// client cannot be built.
    ///
    /// # Examples
    ///
    /// ```
    /// use studymate::supabase::SupabaseClient;
    ///
    /// let client = SupabaseClient::new("https://abc.supabase.co/", "anon").unwrap();
    /// assert_eq!(client.endpoint("/rest/v1/messages"), "https://abc.supabase.co/rest/v1/messages");
    /// ```
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(StudymateError::Config("backend url is empty".to_string()).into());
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("studymate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StudymateError::Config(format!("Failed to create HTTP client: {}", e)))?;

        tracing::debug!("Initialized backend client: url={}", base_url);

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                anon_key: anon_key.to_string(),
                session: RwLock::new(None),
            }),
        })
    }

    /// Client for the configured backend
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(&config.url, &config.anon_key)
    }

    /// Absolute URL for `path`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'))
    }

    /// Project base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Current session, if signed in
    pub fn session(&self) -> Option<AuthSession> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current session
    pub fn set_session(&self, session: Option<AuthSession>) {
        *self
            .inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session;
    }

    /// Auth adapter over this client
    pub fn auth(&self) -> SupabaseAuth {
        SupabaseAuth::new(self.clone())
    }

    /// Storage adapter over this client
    pub fn storage(&self) -> SupabaseStorage {
        SupabaseStorage::new(self.clone())
    }

    /// Database adapter over this client
    pub fn database(&self) -> PostgrestDatabase {
        PostgrestDatabase::new(self.clone())
    }

    /// Request with the `apikey` header and the session's bearer token,
    /// falling back to the anon key when signed out
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self
            .session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.inner.anon_key.clone());
        self.inner
            .http
            .request(method, self.endpoint(path))
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(bearer)
    }
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.inner.base_url)
            .field("signed_in", &self.session().is_some())
            .finish()
    }
}

/// Reads the body of a failed response and builds the matching error
pub(crate) async fn error_for_response(
    service: &str,
    response: reqwest::Response,
    wrap: fn(String) -> StudymateError,
) -> StudymateError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::error!("{} returned error {}: {}", service, status, body);
    crate::error::http_status_error(service, status, &body, wrap)
}
