//! Attachment pipeline
//!
//! Files move through three forms:
//!
//! - [`PendingAttachment`]: a staged local file plus a preview reference
//! - [`PersistedAttachment`]: the storage path written next to a message
//! - [`ChatAttachment`]: the display form carrying a time-limited URL
//!
//! Uploads are all-or-nothing per batch. Re-hydrating history is the
//! opposite: each attachment is re-signed on its own and a failure only
//! degrades that attachment to a placeholder.

use bytes::Bytes;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::error::{Result, StudymateError};
use crate::storage::{ObjectStorage, UploadOptions};

pub mod preview;

pub use preview::{LocalPreviews, PreviewRef, PreviewRegistry};

/// A file picked by the user, held in memory until upload
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    /// Original file name
    pub name: String,
    /// Declared MIME type
    pub mime_type: String,
    /// Raw contents
    pub bytes: Bytes,
}

impl LocalFile {
    /// Wrap in-memory bytes
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension
    pub async fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                StudymateError::Validation(format!("{} has no file name", path.display()))
            })?;
        Ok(Self::new(name, mime_for_path(path), bytes))
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Attachment as written to durable storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAttachment {
    /// Original file name
    pub name: String,
    /// Declared MIME type
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
    /// Object path inside the attachments bucket
    pub path: String,
}

/// Attachment as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAttachment {
    /// Original file name
    pub name: String,
    /// Declared MIME type
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
    /// Object path inside the attachments bucket
    pub path: String,
    /// Time-limited URL; `None` renders as a non-navigable placeholder
    pub url: Option<String>,
}

impl ChatAttachment {
    /// Whether the attachment can be opened
    pub fn is_available(&self) -> bool {
        self.url.is_some()
    }

    /// Persisted form of this attachment
    pub fn to_persisted(&self) -> PersistedAttachment {
        PersistedAttachment {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
            path: self.path.clone(),
        }
    }
}

/// A staged file waiting to be sent
#[derive(Debug)]
pub struct PendingAttachment {
    /// The staged file
    pub file: LocalFile,
    preview: PreviewRef,
}

impl PendingAttachment {
    /// Local preview reference for display before upload
    pub fn preview_url(&self) -> &str {
        self.preview.as_str()
    }
}

/// Result of uploading one staged file
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedAttachment {
    /// Form written alongside the message
    pub persisted: PersistedAttachment,
    /// Form shown in the transcript
    pub display: ChatAttachment,
}

/// Stages, uploads and re-signs chat attachments
pub struct AttachmentPipeline {
    storage: Arc<dyn ObjectStorage>,
    previews: Arc<dyn PreviewRegistry>,
    bucket: String,
    signed_url_ttl: u64,
    staged: Vec<PendingAttachment>,
}

impl AttachmentPipeline {
    /// Default validity of minted URLs: 24 hours
    pub const SIGNED_URL_TTL_SECONDS: u64 = 24 * 60 * 60;

    /// Create a pipeline writing to `bucket`
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        previews: Arc<dyn PreviewRegistry>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            previews,
            bucket: bucket.into(),
            signed_url_ttl: Self::SIGNED_URL_TTL_SECONDS,
            staged: Vec::new(),
        }
    }

    /// Override the signed URL validity window
    pub fn with_signed_url_ttl(mut self, ttl_seconds: u64) -> Self {
        self.signed_url_ttl = ttl_seconds;
        self
    }

    /// Stage files for the next send
    ///
    /// Every file gets its own preview reference. Files are appended as
    /// given; staging the same file twice stages it twice.
    pub fn stage_files(&mut self, files: impl IntoIterator<Item = LocalFile>) -> &[PendingAttachment] {
        for file in files {
            let preview = PreviewRef::mint(self.previews.clone(), &file);
            tracing::debug!(name = %file.name, size = file.size(), "Staged attachment");
            self.staged.push(PendingAttachment { file, preview });
        }
        &self.staged
    }

    /// Remove one staged file, releasing its preview
    pub fn remove_staged(&mut self, index: usize) -> Option<LocalFile> {
        if index >= self.staged.len() {
            return None;
        }
        let pending = self.staged.remove(index);
        pending.preview.release();
        Some(pending.file)
    }

    /// Drop every staged file, releasing their previews
    pub fn clear_staged(&mut self) {
        for pending in self.staged.drain(..) {
            pending.preview.release();
        }
    }

    /// Currently staged files
    pub fn staged(&self) -> &[PendingAttachment] {
        &self.staged
    }

    /// Whether anything is staged
    pub fn has_staged(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Upload every staged file in order
    ///
    /// Each file is uploaded without overwrite to a path namespaced by user,
    /// timestamp and ordinal, then signed for the configured window. The
    /// first failure aborts the batch and leaves the staged list untouched.
    /// On success all previews are released and the staged list is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`StudymateError::Unauthorized`] without a user, or the first
    /// upload / signing error.
    pub async fn upload_all(&mut self, user_id: Option<&str>) -> Result<Vec<UploadedAttachment>> {
        let user_id = user_id.ok_or_else(|| {
            StudymateError::Unauthorized("sign in to upload attachments".to_string())
        })?;

        let timestamp = Utc::now().timestamp_millis();
        let mut uploaded = Vec::with_capacity(self.staged.len());

        for (index, pending) in self.staged.iter().enumerate() {
            let file = &pending.file;
            let path = storage_path(user_id, timestamp, index, &file.name);

            self.storage
                .upload(
                    &self.bucket,
                    &path,
                    file.bytes.clone(),
                    &UploadOptions::attachment(file.mime_type.clone()),
                )
                .await?;

            let url = self
                .storage
                .create_signed_url(&self.bucket, &path, self.signed_url_ttl)
                .await?;

            tracing::info!(path = %path, size = file.size(), "Uploaded attachment");

            let persisted = PersistedAttachment {
                name: file.name.clone(),
                mime_type: file.mime_type.clone(),
                size: file.size(),
                path,
            };
            let display = ChatAttachment {
                name: persisted.name.clone(),
                mime_type: persisted.mime_type.clone(),
                size: persisted.size,
                path: persisted.path.clone(),
                url: Some(url),
            };
            uploaded.push(UploadedAttachment { persisted, display });
        }

        self.clear_staged();
        Ok(uploaded)
    }

    /// Re-sign stored attachments for display
    ///
    /// A signing failure only affects its own attachment, which comes back
    /// with `url = None`.
    pub async fn resolve_history(&self, persisted: &[PersistedAttachment]) -> Vec<ChatAttachment> {
        let mut resolved = Vec::with_capacity(persisted.len());
        for attachment in persisted {
            let url = match self
                .storage
                .create_signed_url(&self.bucket, &attachment.path, self.signed_url_ttl)
                .await
            {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(path = %attachment.path, "Failed to re-sign attachment: {}", e);
                    None
                }
            };
            resolved.push(ChatAttachment {
                name: attachment.name.clone(),
                mime_type: attachment.mime_type.clone(),
                size: attachment.size,
                path: attachment.path.clone(),
                url,
            });
        }
        resolved
    }
}

impl std::fmt::Debug for AttachmentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentPipeline")
            .field("bucket", &self.bucket)
            .field("signed_url_ttl", &self.signed_url_ttl)
            .field("staged", &self.staged.len())
            .finish()
    }
}

/// Replace every character outside `[A-Za-z0-9.-]` with `_`
///
/// # Examples
///
/// ```
/// use studymate::attachments::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("lab report (v2).pdf"), "lab_report__v2_.pdf");
/// ```
pub fn sanitize_file_name(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars =
        UNSAFE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9.\-]").expect("valid file name pattern"));
    unsafe_chars.replace_all(name, "_").into_owned()
}

/// Storage path for the `index`-th file of a batch uploaded at `timestamp`
///
/// # Examples
///
/// ```
/// use studymate::attachments::storage_path;
///
/// assert_eq!(
///     storage_path("user-1", 1700000000000, 2, "my notes.txt"),
///     "user-1/1700000000000_2_my_notes.txt"
/// );
/// ```
pub fn storage_path(user_id: &str, timestamp: i64, index: usize, name: &str) -> String {
    format!(
        "{}/{}_{}_{}",
        user_id,
        timestamp,
        index,
        sanitize_file_name(name)
    )
}

/// Best-effort MIME type from a file extension
pub fn mime_for_path(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryObjectStorage;

    fn pipeline(storage: Arc<MemoryObjectStorage>, previews: Arc<LocalPreviews>) -> AttachmentPipeline {
        AttachmentPipeline::new(storage, previews, "chat-attachments")
    }

    fn file(name: &str, len: usize) -> LocalFile {
        LocalFile::new(name, "text/plain", vec![b'x'; len])
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("notes.txt"), "notes.txt");
        assert_eq!(sanitize_file_name("ch 3 – cells!.pdf"), "ch_3___cells_.pdf");
        assert_eq!(sanitize_file_name("a-b.c"), "a-b.c");
        assert_eq!(sanitize_file_name("résumé.doc"), "r_sum_.doc");
    }

    #[test]
    fn test_storage_path_layout() {
        assert_eq!(
            storage_path("u1", 42, 0, "x y.png"),
            "u1/42_0_x_y.png".to_string()
        );
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("a/b/report.PDF")), "application/pdf");
        assert_eq!(mime_for_path(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("Makefile")), "application/octet-stream");
    }

    #[test]
    fn test_stage_never_deduplicates() {
        let previews = Arc::new(LocalPreviews::new());
        let mut p = pipeline(Arc::new(MemoryObjectStorage::new()), previews.clone());
        let f = file("a.txt", 3);
        p.stage_files(vec![f.clone()]);
        p.stage_files(vec![f]);
        assert_eq!(p.staged().len(), 2);
        assert_eq!(previews.live_count(), 2);
        assert_ne!(p.staged()[0].preview_url(), p.staged()[1].preview_url());
    }

    #[test]
    fn test_remove_staged_releases_preview() {
        let previews = Arc::new(LocalPreviews::new());
        let mut p = pipeline(Arc::new(MemoryObjectStorage::new()), previews.clone());
        p.stage_files(vec![file("a.txt", 1), file("b.txt", 1)]);

        let removed = p.remove_staged(0).unwrap();
        assert_eq!(removed.name, "a.txt");
        assert_eq!(previews.live_count(), 1);
        assert!(p.remove_staged(5).is_none());
    }

    #[test]
    fn test_dropping_pipeline_releases_previews() {
        let previews = Arc::new(LocalPreviews::new());
        {
            let mut p = pipeline(Arc::new(MemoryObjectStorage::new()), previews.clone());
            p.stage_files(vec![file("a.txt", 1), file("b.txt", 1)]);
        }
        assert_eq!(previews.live_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_requires_user() {
        let previews = Arc::new(LocalPreviews::new());
        let storage = Arc::new(MemoryObjectStorage::new());
        let mut p = pipeline(storage.clone(), previews.clone());
        p.stage_files(vec![file("a.txt", 1)]);

        let err = p.upload_all(None).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StudymateError>(),
            Some(StudymateError::Unauthorized(_))
        ));
        assert_eq!(storage.object_count(), 0);
        assert_eq!(p.staged().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_all_in_order_and_clears() {
        let previews = Arc::new(LocalPreviews::new());
        let storage = Arc::new(MemoryObjectStorage::new());
        let mut p = pipeline(storage.clone(), previews.clone());
        p.stage_files(vec![file("first.txt", 10), file("second file.txt", 20), file("third.txt", 30)]);

        let uploaded = p.upload_all(Some("user-1")).await.unwrap();
        assert_eq!(uploaded.len(), 3);
        let names: Vec<_> = uploaded.iter().map(|u| u.persisted.name.as_str()).collect();
        assert_eq!(names, vec!["first.txt", "second file.txt", "third.txt"]);
        assert!(uploaded[1].persisted.path.starts_with("user-1/"));
        assert!(uploaded[1].persisted.path.ends_with("_1_second_file.txt"));
        assert_eq!(uploaded[2].display.size, 30);
        assert!(uploaded.iter().all(|u| u.display.url.is_some()));

        assert!(p.staged().is_empty());
        assert_eq!(previews.live_count(), 0);
        assert_eq!(storage.object_count(), 3);
        assert_eq!(storage.last_ttl(), Some(86_400));
    }

    #[tokio::test]
    async fn test_upload_aborts_on_first_failure() {
        let previews = Arc::new(LocalPreviews::new());
        let storage = Arc::new(MemoryObjectStorage::new());
        storage.fail_uploads_after(1);
        let mut p = pipeline(storage.clone(), previews.clone());
        p.stage_files(vec![file("a.txt", 1), file("b.txt", 1), file("c.txt", 1)]);

        assert!(p.upload_all(Some("user-1")).await.is_err());
        assert_eq!(storage.upload_attempts(), 2);
        assert_eq!(p.staged().len(), 3);
        assert_eq!(previews.live_count(), 3);
    }

    #[tokio::test]
    async fn test_signing_failure_aborts_upload_batch() {
        let storage = Arc::new(MemoryObjectStorage::new());
        storage.set_signing_fails(true);
        let mut p = pipeline(storage.clone(), Arc::new(LocalPreviews::new()));
        p.stage_files(vec![file("a.txt", 1), file("b.txt", 1)]);

        assert!(p.upload_all(Some("user-1")).await.is_err());
        assert_eq!(storage.upload_attempts(), 1);
    }

    #[tokio::test]
    async fn test_resolve_history_degrades_individually() {
        let storage = Arc::new(MemoryObjectStorage::new());
        let p = pipeline(storage.clone(), Arc::new(LocalPreviews::new()));
        storage.fail_signing_for("u/1_1_broken.txt");

        let persisted = vec![
            PersistedAttachment {
                name: "ok.txt".into(),
                mime_type: "text/plain".into(),
                size: 1,
                path: "u/1_0_ok.txt".into(),
            },
            PersistedAttachment {
                name: "broken.txt".into(),
                mime_type: "text/plain".into(),
                size: 2,
                path: "u/1_1_broken.txt".into(),
            },
        ];

        let resolved = p.resolve_history(&persisted).await;
        assert_eq!(resolved.len(), 2);
        assert!(resolved[0].is_available());
        assert!(!resolved[1].is_available());
        assert_eq!(resolved[1].name, "broken.txt");
    }

    #[test]
    fn test_persisted_attachment_uses_type_key() {
        let attachment = PersistedAttachment {
            name: "a.png".into(),
            mime_type: "image/png".into(),
            size: 5,
            path: "u/a.png".into(),
        };
        let json = serde_json::to_value(&attachment).unwrap();
        assert_eq!(json["type"], "image/png");
    }
}
