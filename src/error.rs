//! Error types for StudyMate
//!
//! This module defines all error types used throughout the client,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for StudyMate operations
///
/// Adapters raise these at their boundary; controllers convert them into
/// user-visible text (an inline message, a chat bubble or a notification).
#[derive(Error, Debug)]
pub enum StudymateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input rejected before any external call was made
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation requires a signed-in user
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Authentication provider errors (bad credentials, expired session)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Model provider errors (chat, image, live session)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Object storage errors (upload, signed URLs)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Relational persistence errors (conversations, messages, profiles)
    #[error("Database error: {0}")]
    Database(String),

    /// Voice session errors (devices, streaming)
    #[error("Voice session error: {0}")]
    Voice(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket transport errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Result type alias for StudyMate operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

/// Builds the error raised for a non-success HTTP response.
///
/// `401` and `403` always map to [`StudymateError::Authentication`]; other
/// statuses are wrapped by `wrap` so each adapter keeps its own category.
pub(crate) fn http_status_error(
    service: &str,
    status: reqwest::StatusCode,
    body: &str,
    wrap: fn(String) -> StudymateError,
) -> StudymateError {
    let detail = extract_error_message(body).unwrap_or_else(|| body.trim().to_string());
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        StudymateError::Authentication(format!("{} returned {}: {}", service, status, detail))
    } else {
        wrap(format!("{} returned {}: {}", service, status, detail))
    }
}

/// Pulls the human-readable message out of a JSON error body, if any.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    for key in ["msg", "error_description", "message", "error"] {
        match value.get(key) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(serde_json::Value::Object(inner)) => {
                if let Some(serde_json::Value::String(s)) = inner.get("message") {
                    return Some(s.clone());
                }
            }
            _ => {}
        }
    }
    None
}
