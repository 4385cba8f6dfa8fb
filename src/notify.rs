//! Transient user notifications
//!
//! Controllers report things the user should see briefly (a device action,
//! a failed voice session) through the [`Notifier`] trait. The
//! [`NotificationCenter`] keeps them until their time-to-live runs out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::VoiceConfig;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    /// Neutral information
    Info,
    /// Something the user asked for happened
    Success,
    /// Something failed
    Error,
}

/// A notification shown until `ttl` elapses
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Unique id for dismissal
    pub id: u64,
    /// Text to show
    pub message: String,
    /// Severity
    pub level: NotificationLevel,
    /// When it was raised
    pub created_at: Instant,
    /// How long it stays visible
    pub ttl: Duration,
}

impl Notification {
    /// Whether the notification should no longer be shown at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

/// Sink for transient notifications
pub trait Notifier: Send + Sync {
    /// Raise a notification
    fn notify(&self, message: &str, level: NotificationLevel);
}

/// In-memory notification list with automatic expiry
#[derive(Debug)]
pub struct NotificationCenter {
    ttl: Duration,
    next_id: AtomicU64,
    entries: Mutex<Vec<Notification>>,
}

impl NotificationCenter {
    /// Create a center whose notifications live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Create a center using `voice.notification_ttl_ms`
    pub fn from_config(voice: &VoiceConfig) -> Self {
        Self::new(Duration::from_millis(voice.notification_ttl_ms))
    }

    /// Notifications still visible now
    pub fn active(&self) -> Vec<Notification> {
        self.active_at(Instant::now())
    }

    /// Notifications still visible at `now`; expired ones are discarded
    pub fn active_at(&self, now: Instant) -> Vec<Notification> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|n| !n.is_expired(now));
        entries.clone()
    }

    /// Remove one notification before it expires
    pub fn dismiss(&self, id: u64) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|n| n.id != id);
    }
}

impl Notifier for NotificationCenter {
    fn notify(&self, message: &str, level: NotificationLevel) {
        match level {
            NotificationLevel::Error => tracing::warn!("{}", message),
            _ => tracing::info!("{}", message),
        }
        let notification = Notification {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            message: message.to_string(),
            level,
            created_at: Instant::now(),
            ttl: self.ttl,
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}
