//! Chat orchestration over one active conversation
//!
//! [`ChatOrchestrator`] owns the transcript, the model session and the
//! attachment pipeline for the conversation currently on screen.
//!
//! ```text
//! Uninitialized -> GreetingDisplayed -> HistoryLoading -> Ready
//! ```
//!
//! While in `Ready`, a `sending` flag rejects overlapping sends. The flag
//! is released by a guard, so it clears on every exit path including a
//! dropped future.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::attachments::{AttachmentPipeline, LocalFile, PersistedAttachment};
use crate::auth::User;
use crate::error::{Result, StudymateError};
use crate::prompts;
use crate::providers::{ChatModel, ChatSession};
use crate::storage::{ConversationRecord, Database, NewMessage};

pub mod title;
pub mod types;

pub use title::{derive_title, TITLE_MAX_WORDS};
pub use types::{ChatMessage, Role, SaveState, TranscriptEntry};

/// Where the orchestrator is in its activation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    /// Never activated
    Uninitialized,
    /// Greeting shown, no history requested
    GreetingDisplayed,
    /// History is being fetched
    HistoryLoading,
    /// Accepting messages
    Ready,
}

/// Static settings of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    /// Chat model identifier
    pub model: String,
    /// Title given to new conversations
    pub default_title: String,
}

#[derive(Debug)]
struct ChatState {
    phase: ChatPhase,
    transcript: Vec<TranscriptEntry>,
    user: Option<User>,
    memory_enabled: bool,
    conversation: Option<ConversationRecord>,
    title_pending: bool,
}

impl ChatState {
    fn new() -> Self {
        Self {
            phase: ChatPhase::Uninitialized,
            transcript: Vec::new(),
            user: None,
            memory_enabled: false,
            conversation: None,
            title_pending: false,
        }
    }
}

struct SendingGuard<'a>(&'a AtomicBool);

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives one conversation: activation, sending and title assignment
pub struct ChatOrchestrator {
    model: Arc<dyn ChatModel>,
    db: Arc<dyn Database>,
    settings: ChatSettings,
    attachments: tokio::sync::Mutex<AttachmentPipeline>,
    session: tokio::sync::Mutex<Option<Box<dyn ChatSession>>>,
    state: Mutex<ChatState>,
    sending: AtomicBool,
    generation: AtomicU64,
}

impl ChatOrchestrator {
    /// Create an orchestrator; nothing happens until [`Self::activate`]
    pub fn new(
        model: Arc<dyn ChatModel>,
        db: Arc<dyn Database>,
        attachments: AttachmentPipeline,
        settings: ChatSettings,
    ) -> Self {
        Self {
            model,
            db,
            settings,
            attachments: tokio::sync::Mutex::new(attachments),
            session: tokio::sync::Mutex::new(None),
            state: Mutex::new(ChatState::new()),
            sending: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current phase
    pub fn phase(&self) -> ChatPhase {
        self.state().phase
    }

    /// Snapshot of the transcript
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.state().transcript.clone()
    }

    /// The active conversation, if any
    pub fn conversation(&self) -> Option<ConversationRecord> {
        self.state().conversation.clone()
    }

    /// Whether a send is in flight
    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst)
    }

    /// Start over for a user, memory mode and conversation
    ///
    /// Opens a fresh model session and shows the greeting. With memory on
    /// and a known user, the given conversation (or the user's most recent
    /// one when no id is given) is loaded after the greeting. A user with no
    /// conversations gets one on the first saved message. History failures
    /// degrade to the greeting alone. A later activation supersedes the
    /// result of an earlier one still in flight.
    ///
    /// # Errors
    ///
    /// Returns the model error when no session can be opened; the greeting
    /// is still shown and sends are rejected until the next activation.
    pub async fn activate(
        &self,
        user: Option<User>,
        memory_enabled: bool,
        conversation_id: Option<&str>,
    ) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let user_name = user.as_ref().map(|u| u.greeting_name().to_string());
        let instruction = prompts::system_instruction(memory_enabled, user_name.as_deref());

        let mut session_slot = self.session.lock().await;
        *session_slot = None;
        self.attachments.lock().await.clear_staged();

        {
            let mut state = self.state();
            *state = ChatState::new();
            state.phase = ChatPhase::GreetingDisplayed;
            state.transcript.push(TranscriptEntry::local(ChatMessage::model(prompts::greeting(
                user_name.as_deref(),
            ))));
            state.user = user.clone();
            state.memory_enabled = memory_enabled;
        }

        let session = self.model.start_chat(&self.settings.model, &instruction);
        let session = match session {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Failed to open chat session: {}", e);
                self.state().phase = ChatPhase::Ready;
                return Err(e);
            }
        };
        *session_slot = Some(session);
        drop(session_slot);

        let user = match (memory_enabled, user) {
            (true, Some(user)) => user,
            _ => {
                self.state().phase = ChatPhase::Ready;
                return Ok(());
            }
        };

        self.state().phase = ChatPhase::HistoryLoading;
        let loaded = self.load_conversation(&user, conversation_id).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Discarding superseded history load");
            return Ok(());
        }

        let mut state = self.state();
        match loaded {
            Ok(None) => tracing::debug!("No conversation yet; one is created on first save"),
            Ok(Some((conversation, history))) => {
                let has_user_turn = history.iter().any(|e| e.message.role == Role::User);
                state.title_pending =
                    conversation.title == self.settings.default_title && !has_user_turn;
                tracing::info!(
                    conversation_id = %conversation.id,
                    messages = history.len(),
                    "Loaded conversation"
                );
                state.conversation = Some(conversation);
                state.transcript.extend(history);
            }
            Err(e) => {
                tracing::warn!("Failed to load chat history, showing greeting only: {}", e);
            }
        }
        state.phase = ChatPhase::Ready;
        Ok(())
    }

    async fn load_conversation(
        &self,
        user: &User,
        conversation_id: Option<&str>,
    ) -> Result<Option<(ConversationRecord, Vec<TranscriptEntry>)>> {
        let conversation = match conversation_id {
            Some(id) => self
                .db
                .get_conversation(id)
                .await?
                .filter(|c| c.user_id == user.id)
                .ok_or_else(|| StudymateError::Database(format!("conversation {} not found", id)))?,
            None => match self.db.list_conversations(&user.id).await?.into_iter().next() {
                Some(latest) => latest,
                None => return Ok(None),
            },
        };

        let records = self.db.list_messages(&user.id, &conversation.id).await?;
        let pipeline = self.attachments.lock().await;
        let mut history = Vec::with_capacity(records.len());
        for record in records {
            let attachments = match record.attachments.as_deref() {
                Some(persisted) if !persisted.is_empty() => pipeline.resolve_history(persisted).await,
                _ => Vec::new(),
            };
            let message = ChatMessage {
                role: record.role,
                content: record.content,
                attachments: None,
            }
            .with_attachments(attachments);
            history.push(TranscriptEntry::saved(message));
        }
        Ok(Some((conversation, history)))
    }

    /// Stage files for the next send; returns how many are staged now
    pub async fn stage_files(&self, files: Vec<LocalFile>) -> usize {
        let mut pipeline = self.attachments.lock().await;
        pipeline.stage_files(files).len()
    }

    /// Remove a staged file
    pub async fn remove_staged(&self, index: usize) -> Option<LocalFile> {
        self.attachments.lock().await.remove_staged(index)
    }

    /// Names of the staged files
    pub async fn staged_names(&self) -> Vec<String> {
        self.attachments
            .lock()
            .await
            .staged()
            .iter()
            .map(|p| p.file.name.clone())
            .collect()
    }

    /// Send a message with whatever is staged
    ///
    /// Returns the transcript entries this send appended. Failures after the
    /// send starts are not returned as errors: they become a single
    /// model-role entry carrying the error text.
    ///
    /// # Errors
    ///
    /// Returns a validation error, with nothing appended and no model call,
    /// when the text is blank and nothing is staged, when a send is already
    /// in flight, or when there is no active session.
    pub async fn send(&self, text: &str) -> Result<Vec<TranscriptEntry>> {
        let text = text.trim();
        let has_staged = self.attachments.lock().await.has_staged();
        if text.is_empty() && !has_staged {
            return Err(StudymateError::Validation("message is empty".to_string()).into());
        }
        if self.sending.swap(true, Ordering::SeqCst) {
            return Err(
                StudymateError::Validation("a message is already being sent".to_string()).into(),
            );
        }
        let _sending = SendingGuard(&self.sending);

        let mut session_slot = self.session.lock().await;
        let Some(session) = session_slot.as_mut() else {
            return Err(StudymateError::Validation("no active chat session".to_string()).into());
        };

        let start = self.state().transcript.len();
        if let Err(e) = self.send_turn(session.as_mut(), text, has_staged).await {
            tracing::warn!("Send failed: {}", e);
            self.append(TranscriptEntry::local(ChatMessage::model(format!("{}", e))));
        }

        let state = self.state();
        Ok(state.transcript.get(start..).map(<[_]>::to_vec).unwrap_or_default())
    }

    async fn send_turn(
        &self,
        session: &mut dyn ChatSession,
        text: &str,
        has_staged: bool,
    ) -> Result<()> {
        let (user, memory_enabled) = {
            let state = self.state();
            (state.user.clone(), state.memory_enabled)
        };
        let eligible = memory_enabled && user.is_some();

        if has_staged && !eligible {
            return Err(StudymateError::Unauthorized(
                "sign in with memory enabled to send attachments".to_string(),
            )
            .into());
        }

        let uploaded = if has_staged {
            let user_id = user.as_ref().map(|u| u.id.as_str());
            self.attachments.lock().await.upload_all(user_id).await?
        } else {
            Vec::new()
        };
        let display: Vec<_> = uploaded.iter().map(|u| u.display.clone()).collect();
        let persisted: Vec<_> = uploaded.into_iter().map(|u| u.persisted).collect();

        let user_message = ChatMessage::user(text).with_attachments(display.clone());
        let save_state = match &user {
            Some(user) if eligible => {
                self.persist(user, Role::User, text, Some(persisted)).await
            }
            _ => SaveState::Local,
        };
        self.append(TranscriptEntry {
            message: user_message,
            save_state,
        });

        if eligible {
            self.assign_title(text).await;
        }

        let prompt = prompts::compose_prompt(text, &display);
        let reply = session.send(&prompt).await?;

        let save_state = match &user {
            Some(user) if eligible => self.persist(user, Role::Model, &reply, None).await,
            _ => SaveState::Local,
        };
        self.append(TranscriptEntry {
            message: ChatMessage::model(reply),
            save_state,
        });
        Ok(())
    }

    fn append(&self, entry: TranscriptEntry) {
        self.state().transcript.push(entry);
    }

    async fn ensure_conversation(&self, user: &User) -> Result<ConversationRecord> {
        if let Some(conversation) = self.conversation() {
            return Ok(conversation);
        }
        let created = self
            .db
            .create_conversation(&user.id, &self.settings.default_title)
            .await?;
        tracing::info!(conversation_id = %created.id, "Created conversation");
        let mut state = self.state();
        state.title_pending = true;
        state.conversation = Some(created.clone());
        Ok(created)
    }

    async fn persist(
        &self,
        user: &User,
        role: Role,
        content: &str,
        attachments: Option<Vec<PersistedAttachment>>,
    ) -> SaveState {
        let conversation = match self.ensure_conversation(user).await {
            Ok(conversation) => conversation,
            Err(e) => {
                tracing::warn!("No conversation to save into: {}", e);
                return SaveState::Unsaved;
            }
        };
        let message = NewMessage {
            user_id: user.id.clone(),
            conversation_id: conversation.id,
            role,
            content: content.to_string(),
            attachments: attachments.filter(|a| !a.is_empty()),
        };
        match self.db.insert_message(&message).await {
            Ok(()) => SaveState::Saved,
            Err(e) => {
                tracing::warn!(role = %role, "Failed to save message: {}", e);
                SaveState::Unsaved
            }
        }
    }

    /// Rewrite the default title from the first user message
    ///
    /// Runs at most once per conversation; the update is conditioned on the
    /// stored title still being the default.
    async fn assign_title(&self, text: &str) {
        let Some(title) = derive_title(text) else {
            return;
        };
        let conversation_id = {
            let mut state = self.state();
            if !state.title_pending {
                return;
            }
            let Some(conversation) = state.conversation.as_ref() else {
                return;
            };
            let id = conversation.id.clone();
            state.title_pending = false;
            id
        };

        match self
            .db
            .update_title_if(&conversation_id, &self.settings.default_title, &title)
            .await
        {
            Ok(true) => {
                tracing::info!(conversation_id = %conversation_id, title = %title, "Assigned conversation title");
                if let Some(conversation) = self.state().conversation.as_mut() {
                    conversation.title = title;
                }
            }
            Ok(false) => tracing::debug!("Conversation already has a title"),
            Err(e) => tracing::warn!("Failed to assign conversation title: {}", e),
        }
    }

    /// Create a conversation for the signed-in user and switch to it
    ///
    /// # Errors
    ///
    /// Returns [`StudymateError::Unauthorized`] when nobody is signed in, or
    /// the database error.
    pub async fn new_conversation(&self) -> Result<ConversationRecord> {
        let (user, memory_enabled) = {
            let state = self.state();
            (state.user.clone(), state.memory_enabled)
        };
        let user = user.ok_or_else(|| {
            StudymateError::Unauthorized("sign in to create conversations".to_string())
        })?;
        let created = self
            .db
            .create_conversation(&user.id, &self.settings.default_title)
            .await?;
        self.activate(Some(user), memory_enabled, Some(&created.id)).await?;
        Ok(created)
    }

    /// Conversations of the signed-in user, newest first
    ///
    /// # Errors
    ///
    /// Returns [`StudymateError::Unauthorized`] when nobody is signed in, or
    /// the database error.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationRecord>> {
        let user = self.state().user.clone().ok_or_else(|| {
            StudymateError::Unauthorized("sign in to list conversations".to_string())
        })?;
        self.db.list_conversations(&user.id).await
    }
}

impl std::fmt::Debug for ChatOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ChatOrchestrator")
            .field("phase", &state.phase)
            .field("messages", &state.transcript.len())
            .field("sending", &self.is_sending())
            .finish()
    }
}
