//! Chat persistence integration tests
//!
//! Drive the orchestrator against the SQLite database and in-memory object
//! storage, then reload conversations through a fresh orchestrator the way
//! a restarted client would.

mod common;

use std::sync::Arc;

use studymate::attachments::LocalFile;
use studymate::chat::{ChatPhase, Role, SaveState};
use studymate::fakes::{MemoryObjectStorage, ScriptedChatModel};
use studymate::storage::Database;

#[tokio::test]
async fn test_attachments_reload_with_fresh_urls() {
    let (db, _tmp) = common::create_temp_database();
    let storage = Arc::new(MemoryObjectStorage::new());
    let ada = common::student("user-1", "Ada");

    let model = Arc::new(ScriptedChatModel::new());
    model.push_reply("Both files look like lab notes.");
    let first = common::orchestrator(model.clone(), db.clone(), storage.clone());
    first.activate(Some(ada.clone()), true, None).await.unwrap();

    first
        .stage_files(vec![
            LocalFile::new("lab notes.txt", "text/plain", b"titration results".to_vec()),
            LocalFile::new("graph.png", "image/png", vec![0u8; 3000]),
        ])
        .await;
    let appended = first.send("What do these show?").await.unwrap();
    assert_eq!(appended[0].save_state, SaveState::Saved);
    let sent = appended[0].message.attachments.clone().unwrap();
    let conversation_id = first.conversation().unwrap().id;
    drop(first);

    let second = common::orchestrator(
        Arc::new(ScriptedChatModel::new()),
        db.clone(),
        storage.clone(),
    );
    second
        .activate(Some(ada), true, Some(&conversation_id))
        .await
        .unwrap();
    assert_eq!(second.phase(), ChatPhase::Ready);

    let transcript = second.transcript();
    // greeting, user turn, model turn
    assert_eq!(transcript.len(), 3);
    let reloaded = transcript[1].message.attachments.clone().unwrap();
    assert_eq!(reloaded.len(), 2);

    for (before, after) in sent.iter().zip(&reloaded) {
        assert_eq!(before.name, after.name);
        assert_eq!(before.mime_type, after.mime_type);
        assert_eq!(before.size, after.size);
        assert_eq!(before.path, after.path);
        assert!(after.url.is_some());
        assert_ne!(before.url, after.url);
    }
    assert_ne!(reloaded[0].url, reloaded[1].url);
    assert_eq!(reloaded[0].name, "lab notes.txt");
    assert_eq!(reloaded[1].size, 3000);
    assert_eq!(
        transcript[2].message.content,
        "Both files look like lab notes."
    );
    assert!(transcript[2].message.attachments.is_none());
}

#[tokio::test]
async fn test_first_message_titles_conversation_once() {
    let (db, _tmp) = common::create_temp_database();
    let storage = Arc::new(MemoryObjectStorage::new());
    let model = Arc::new(ScriptedChatModel::new());
    let chat = common::orchestrator(model, db.clone(), storage);
    let ada = common::student("user-1", "Ada");

    chat.activate(Some(ada.clone()), true, None).await.unwrap();
    chat.send("Can you help me study for my biology exam tomorrow please")
        .await
        .unwrap();
    chat.send("Start with photosynthesis").await.unwrap();

    let listed = db.list_conversations(&ada.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Can you help me study for my…");

    let messages = db.list_messages(&ada.id, &listed[0].id).await.unwrap();
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Model, Role::User, Role::Model]);
}

#[tokio::test]
async fn test_resumed_conversation_keeps_its_title() {
    let (db, _tmp) = common::create_temp_database();
    let ada = common::student("user-1", "Ada");
    let existing = db.create_conversation(&ada.id, "Organic chemistry").await.unwrap();

    let chat = common::orchestrator(
        Arc::new(ScriptedChatModel::new()),
        db.clone(),
        Arc::new(MemoryObjectStorage::new()),
    );
    chat.activate(Some(ada), true, Some(&existing.id)).await.unwrap();
    chat.send("Explain chirality").await.unwrap();

    let reloaded = db.get_conversation(&existing.id).await.unwrap().unwrap();
    assert_eq!(reloaded.title, "Organic chemistry");
}

#[tokio::test]
async fn test_empty_send_reaches_no_model() {
    let (db, _tmp) = common::create_temp_database();
    let model = Arc::new(ScriptedChatModel::new());
    let chat = common::orchestrator(
        model.clone(),
        db.clone(),
        Arc::new(MemoryObjectStorage::new()),
    );
    let ada = common::student("user-1", "Ada");
    chat.activate(Some(ada.clone()), true, None).await.unwrap();

    assert!(chat.send("").await.is_err());
    assert!(chat.send(" \n\t").await.is_err());

    assert!(model.prompts().is_empty());
    assert!(chat.conversation().is_none());
    assert!(db.list_conversations(&ada.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_restarted_client_resumes_latest_conversation() {
    let (db, _tmp) = common::create_temp_database();
    let storage = Arc::new(MemoryObjectStorage::new());
    let ada = common::student("user-1", "Ada");

    // Opening the chat twice without sending leaves nothing behind
    for _ in 0..2 {
        let idle = common::orchestrator(Arc::new(ScriptedChatModel::new()), db.clone(), storage.clone());
        idle.activate(Some(ada.clone()), true, None).await.unwrap();
    }
    assert!(db.list_conversations(&ada.id).await.unwrap().is_empty());

    let model = Arc::new(ScriptedChatModel::new());
    model.push_reply("A mole is 6.022e23 particles.");
    let first = common::orchestrator(model, db.clone(), storage.clone());
    first.activate(Some(ada.clone()), true, None).await.unwrap();
    first.send("What is a mole").await.unwrap();
    let conversation_id = first.conversation().unwrap().id;
    drop(first);

    let second = common::orchestrator(Arc::new(ScriptedChatModel::new()), db.clone(), storage);
    second.activate(Some(ada.clone()), true, None).await.unwrap();

    assert_eq!(second.conversation().unwrap().id, conversation_id);
    let transcript = second.transcript();
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[1].message.content, "What is a mole");
    assert_eq!(db.list_conversations(&ada.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_signed_out_chat_is_never_persisted() {
    let (db, _tmp) = common::create_temp_database();
    let model = Arc::new(ScriptedChatModel::new());
    let chat = common::orchestrator(
        model.clone(),
        db.clone(),
        Arc::new(MemoryObjectStorage::new()),
    );

    chat.activate(None, true, None).await.unwrap();
    let appended = chat.send("What is a mole?").await.unwrap();

    assert_eq!(appended.len(), 2);
    assert!(appended.iter().all(|e| e.save_state == SaveState::Local));
    assert!(chat.conversation().is_none());
    assert_eq!(model.prompts(), vec!["What is a mole?".to_string()]);
}

#[tokio::test]
async fn test_failed_upload_sends_nothing() {
    let (db, _tmp) = common::create_temp_database();
    let storage = Arc::new(MemoryObjectStorage::new());
    storage.fail_uploads_after(1);
    let model = Arc::new(ScriptedChatModel::new());
    let chat = common::orchestrator(model.clone(), db.clone(), storage.clone());
    chat.activate(Some(common::student("user-1", "Ada")), true, None)
        .await
        .unwrap();

    chat.stage_files(vec![
        LocalFile::new("a.txt", "text/plain", b"a".to_vec()),
        LocalFile::new("b.txt", "text/plain", b"b".to_vec()),
    ])
    .await;
    let appended = chat.send("check these").await.unwrap();

    assert_eq!(appended.len(), 1);
    assert_eq!(appended[0].message.role, Role::Model);
    assert!(appended[0].message.content.contains("Storage error"));
    assert!(model.prompts().is_empty());
    assert_eq!(chat.staged_names().await.len(), 2);
}
