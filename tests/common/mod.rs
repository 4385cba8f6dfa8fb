use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use studymate::attachments::{AttachmentPipeline, LocalPreviews};
use studymate::auth::User;
use studymate::chat::{ChatOrchestrator, ChatSettings};
use studymate::fakes::{MemoryObjectStorage, ScriptedChatModel};
use studymate::storage::{Database, SqliteDatabase};

#[allow(dead_code)]
pub fn create_temp_database() -> (Arc<SqliteDatabase>, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("studymate.db");
    let db = SqliteDatabase::new_with_path(db_path).expect("failed to create sqlite database");
    (Arc::new(db), tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn student(id: &str, name: &str) -> User {
    User {
        id: id.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        display_name: Some(name.to_string()),
    }
}

/// Orchestrator over the given database and storage with a scripted model
#[allow(dead_code)]
pub fn orchestrator(
    model: Arc<ScriptedChatModel>,
    db: Arc<dyn Database>,
    storage: Arc<MemoryObjectStorage>,
) -> ChatOrchestrator {
    let pipeline = AttachmentPipeline::new(storage, Arc::new(LocalPreviews::new()), "chat-attachments");
    ChatOrchestrator::new(
        model,
        db,
        pipeline,
        ChatSettings {
            model: "chat-model".to_string(),
            default_title: "New Chat".to_string(),
        },
    )
}
