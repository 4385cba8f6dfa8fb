//! Local preview references for staged files
//!
//! A preview reference is a short-lived handle that lets the front end show
//! a staged file before it is uploaded. Every reference handed out by a
//! [`PreviewRegistry`] must be revoked exactly once; [`PreviewRef`] enforces
//! that by revoking on [`PreviewRef::release`] or on drop, whichever comes
//! first.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::LocalFile;

/// Mints and revokes local preview references.
pub trait PreviewRegistry: Send + Sync {
    /// Create a preview reference for a staged file
    fn create(&self, file: &LocalFile) -> String;

    /// Revoke a reference previously returned by [`PreviewRegistry::create`]
    fn revoke(&self, reference: &str);
}

/// In-process preview registry that tracks live references.
///
/// References look like `preview://<uuid>/<file name>`.
///
/// # Examples
///
/// ```
/// use studymate::attachments::{LocalFile, LocalPreviews, PreviewRegistry};
///
/// let previews = LocalPreviews::new();
/// let file = LocalFile::new("notes.txt", "text/plain", b"hi".to_vec());
/// let reference = previews.create(&file);
/// assert_eq!(previews.live_count(), 1);
/// previews.revoke(&reference);
/// assert_eq!(previews.live_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct LocalPreviews {
    live: Mutex<HashSet<String>>,
}

impl LocalPreviews {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of references minted and not yet revoked
    pub fn live_count(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or_default()
    }

    /// Whether `reference` is still live
    pub fn is_live(&self, reference: &str) -> bool {
        self.live
            .lock()
            .map(|live| live.contains(reference))
            .unwrap_or(false)
    }
}

impl PreviewRegistry for LocalPreviews {
    fn create(&self, file: &LocalFile) -> String {
        let reference = format!("preview://{}/{}", uuid::Uuid::new_v4(), file.name);
        if let Ok(mut live) = self.live.lock() {
            live.insert(reference.clone());
        }
        reference
    }

    fn revoke(&self, reference: &str) {
        let removed = self
            .live
            .lock()
            .map(|mut live| live.remove(reference))
            .unwrap_or(false);
        if !removed {
            tracing::warn!(reference, "Revoked a preview reference that was not live");
        }
    }
}

/// Owned preview reference, revoked exactly once.
pub struct PreviewRef {
    reference: String,
    registry: Arc<dyn PreviewRegistry>,
    released: bool,
}

impl PreviewRef {
    /// Mint a new reference for `file` from `registry`
    pub fn mint(registry: Arc<dyn PreviewRegistry>, file: &LocalFile) -> Self {
        let reference = registry.create(file);
        Self {
            reference,
            registry,
            released: false,
        }
    }

    /// The reference string shown by the front end
    pub fn as_str(&self) -> &str {
        &self.reference
    }

    /// Revoke the reference now
    pub fn release(mut self) {
        self.revoke_once();
    }

    fn revoke_once(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.revoke(&self.reference);
        }
    }
}

impl Drop for PreviewRef {
    fn drop(&mut self) {
        self.revoke_once();
    }
}

impl std::fmt::Debug for PreviewRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewRef")
            .field("reference", &self.reference)
            .field("released", &self.released)
            .finish()
    }
}
