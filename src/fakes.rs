//! In-process fakes for unit and integration tests
//!
//! Every external seam of the client has an in-memory stand-in here so
//! controllers can be exercised without a network or audio hardware:
//!
//! - [`MemoryObjectStorage`] for [`ObjectStorage`]
//! - [`MemoryDatabase`] for [`Database`]
//! - [`FakeAuthProvider`] for [`AuthProvider`]
//! - [`ScriptedChatModel`] for [`ChatModel`]
//! - [`FakeLiveModel`] for [`LiveModel`]
//! - [`FakeAudioDevices`] for [`AudioDevices`]
//!
//! Each fake records what it was asked to do and can be told to fail.
//! The module is only built for tests or with the `test-support` feature.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, Notify};

use crate::auth::{AuthProvider, User};
use crate::error::{Result, StudymateError};
use crate::providers::{
    AudioChunk, ChatModel, ChatSession, FunctionResponse, LiveConfig, LiveConnection, LiveEvent,
    LiveModel, LiveSession,
};
use crate::storage::{
    ConversationRecord, Database, MessageRecord, NewMessage, ObjectStorage, Profile, UploadOptions,
};
use crate::voice::{AudioBuffer, AudioDevices, AudioOutput, Microphone, SourceId};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// MemoryObjectStorage
// ---------------------------------------------------------------------------

/// Object storage kept in a map
///
/// Uploads never overwrite, matching the attachment upload options. Each
/// signing call mints a distinct URL.
///
/// # Examples
///
/// ```
/// use studymate::fakes::MemoryObjectStorage;
/// use studymate::storage::{ObjectStorage, UploadOptions};
///
/// # tokio_test::block_on(async {
/// let storage = MemoryObjectStorage::new();
/// let options = UploadOptions::attachment("text/plain");
/// storage
///     .upload("bucket", "u1/notes.txt", bytes::Bytes::from_static(b"hi"), &options)
///     .await
///     .unwrap();
/// assert!(storage
///     .upload("bucket", "u1/notes.txt", bytes::Bytes::from_static(b"again"), &options)
///     .await
///     .is_err());
///
/// let first = storage.create_signed_url("bucket", "u1/notes.txt", 60).await.unwrap();
/// let second = storage.create_signed_url("bucket", "u1/notes.txt", 60).await.unwrap();
/// assert_ne!(first, second);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryObjectStorage {
    objects: Mutex<HashMap<String, (Bytes, UploadOptions)>>,
    upload_attempts: AtomicUsize,
    uploads_allowed: Mutex<Option<usize>>,
    signing_fails: AtomicBool,
    failing_paths: Mutex<HashSet<String>>,
    signed: AtomicU64,
    last_ttl: Mutex<Option<u64>>,
}

impl MemoryObjectStorage {
    /// Empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the next `n` uploads succeed and fail every one after
    pub fn fail_uploads_after(&self, n: usize) {
        *lock(&self.uploads_allowed) = Some(n);
    }

    /// Make every signing call fail
    pub fn set_signing_fails(&self, fails: bool) {
        self.signing_fails.store(fails, Ordering::SeqCst);
    }

    /// Make signing fail for one path only
    pub fn fail_signing_for(&self, path: &str) {
        lock(&self.failing_paths).insert(path.to_string());
    }

    /// Stored object count
    pub fn object_count(&self) -> usize {
        lock(&self.objects).len()
    }

    /// Stored bytes at `bucket/path`
    pub fn object(&self, bucket: &str, path: &str) -> Option<Bytes> {
        lock(&self.objects)
            .get(&format!("{}/{}", bucket, path))
            .map(|(bytes, _)| bytes.clone())
    }

    /// Options used for the upload at `bucket/path`
    pub fn upload_options(&self, bucket: &str, path: &str) -> Option<UploadOptions> {
        lock(&self.objects)
            .get(&format!("{}/{}", bucket, path))
            .map(|(_, options)| options.clone())
    }

    /// Uploads attempted, including failed ones
    pub fn upload_attempts(&self) -> usize {
        self.upload_attempts.load(Ordering::SeqCst)
    }

    /// TTL passed to the most recent signing call
    pub fn last_ttl(&self) -> Option<u64> {
        *lock(&self.last_ttl)
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        options: &UploadOptions,
    ) -> Result<()> {
        let attempt = self.upload_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(allowed) = *lock(&self.uploads_allowed) {
            if attempt >= allowed {
                return Err(StudymateError::Storage("upload rejected".to_string()).into());
            }
        }

        let key = format!("{}/{}", bucket, path);
        let mut objects = lock(&self.objects);
        if objects.contains_key(&key) && !options.upsert {
            return Err(StudymateError::Storage(format!("{} already exists", key)).into());
        }
        objects.insert(key, (bytes, options.clone()));
        Ok(())
    }

    async fn create_signed_url(&self, bucket: &str, path: &str, ttl_seconds: u64) -> Result<String> {
        *lock(&self.last_ttl) = Some(ttl_seconds);
        if self.signing_fails.load(Ordering::SeqCst) || lock(&self.failing_paths).contains(path) {
            return Err(StudymateError::Storage(format!("cannot sign {}", path)).into());
        }
        let n = self.signed.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!(
            "https://storage.test/{}/{}?token=t{}&expires={}",
            bucket, path, n, ttl_seconds
        ))
    }
}

// ---------------------------------------------------------------------------
// MemoryDatabase
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tables {
    conversations: Vec<ConversationRecord>,
    messages: Vec<MessageRecord>,
    profiles: HashMap<String, Profile>,
}

/// Conversations, messages and profiles kept in vectors
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: Mutex<Tables>,
    profile_upserts_fail: AtomicBool,
    inserts_fail: AtomicBool,
    reads_fail: AtomicBool,
    creates_fail: AtomicBool,
    title_updates: AtomicUsize,
}

impl MemoryDatabase {
    /// Empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Make profile upserts fail
    pub fn set_profile_upserts_fail(&self, fails: bool) {
        self.profile_upserts_fail.store(fails, Ordering::SeqCst);
    }

    /// Make message inserts fail
    pub fn set_inserts_fail(&self, fails: bool) {
        self.inserts_fail.store(fails, Ordering::SeqCst);
    }

    /// Make message and conversation reads fail
    pub fn set_reads_fail(&self, fails: bool) {
        self.reads_fail.store(fails, Ordering::SeqCst);
    }

    /// Make conversation creation fail
    pub fn set_creates_fail(&self, fails: bool) {
        self.creates_fail.store(fails, Ordering::SeqCst);
    }

    /// Profile for `id`
    pub fn profile(&self, id: &str) -> Option<Profile> {
        lock(&self.tables).profiles.get(id).cloned()
    }

    /// Number of profiles
    pub fn profile_count(&self) -> usize {
        lock(&self.tables).profiles.len()
    }

    /// Every stored message in insertion order
    pub fn messages(&self) -> Vec<MessageRecord> {
        lock(&self.tables).messages.clone()
    }

    /// Every stored conversation in insertion order
    pub fn conversations(&self) -> Vec<ConversationRecord> {
        lock(&self.tables).conversations.clone()
    }

    /// Successful conditional title updates
    pub fn title_updates(&self) -> usize {
        self.title_updates.load(Ordering::SeqCst)
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StudymateError::Database(format!("{} failed", what)).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn create_conversation(&self, user_id: &str, title: &str) -> Result<ConversationRecord> {
        self.check(&self.creates_fail, "create conversation")?;
        let mut tables = lock(&self.tables);
        // Strictly increasing timestamps keep "newest first" unambiguous.
        let created_at = tables
            .conversations
            .last()
            .map(|c| c.created_at + ChronoDuration::milliseconds(1))
            .unwrap_or_else(Utc::now)
            .max(Utc::now());
        let record = ConversationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at,
        };
        tables.conversations.push(record.clone());
        Ok(record)
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationRecord>> {
        self.check(&self.reads_fail, "list conversations")?;
        let mut list: Vec<_> = lock(&self.tables)
            .conversations
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        list.reverse();
        Ok(list)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<ConversationRecord>> {
        self.check(&self.reads_fail, "get conversation")?;
        Ok(lock(&self.tables)
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn update_title_if(&self, id: &str, expected: &str, title: &str) -> Result<bool> {
        let mut tables = lock(&self.tables);
        match tables
            .conversations
            .iter_mut()
            .find(|c| c.id == id && c.title == expected)
        {
            Some(conversation) => {
                conversation.title = title.to_string();
                self.title_updates.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<()> {
        self.check(&self.inserts_fail, "insert message")?;
        lock(&self.tables).messages.push(MessageRecord {
            user_id: message.user_id.clone(),
            conversation_id: message.conversation_id.clone(),
            role: message.role,
            content: message.content.clone(),
            attachments: message.attachments.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_messages(&self, user_id: &str, conversation_id: &str) -> Result<Vec<MessageRecord>> {
        self.check(&self.reads_fail, "list messages")?;
        Ok(lock(&self.tables)
            .messages
            .iter()
            .filter(|m| m.user_id == user_id && m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.check(&self.profile_upserts_fail, "upsert profile")?;
        lock(&self.tables)
            .profiles
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeAuthProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct AuthState {
    accounts: HashMap<String, (String, User)>,
    session: Option<User>,
    failure: Option<String>,
    returns_no_user: bool,
}

/// Auth service with accounts kept in memory
#[derive(Debug, Default)]
pub struct FakeAuthProvider {
    state: Mutex<AuthState>,
}

impl FakeAuthProvider {
    /// No accounts, nobody signed in
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account directly
    pub fn add_account(&self, email: &str, password: &str, display_name: Option<&str>) -> User {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            display_name: display_name.map(str::to_string),
        };
        lock(&self.state)
            .accounts
            .insert(email.to_string(), (password.to_string(), user.clone()));
        user
    }

    /// Fail every call with `message`, or stop failing with `None`
    pub fn set_failure(&self, message: Option<&str>) {
        lock(&self.state).failure = message.map(str::to_string);
    }

    /// Succeed without returning a user
    pub fn set_returns_no_user(&self, value: bool) {
        lock(&self.state).returns_no_user = value;
    }

    /// Whether an account exists for `email`
    pub fn has_account(&self, email: &str) -> bool {
        lock(&self.state).accounts.contains_key(email)
    }

    fn fail_if_set(state: &AuthState) -> Result<()> {
        match &state.failure {
            Some(message) => Err(StudymateError::Authentication(message.clone()).into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AuthProvider for FakeAuthProvider {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<Option<User>> {
        let mut state = lock(&self.state);
        Self::fail_if_set(&state)?;
        if state.accounts.contains_key(email) {
            return Err(StudymateError::Authentication("User already registered".to_string()).into());
        }
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            display_name: metadata
                .get("display_name")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        };
        state
            .accounts
            .insert(email.to_string(), (password.to_string(), user.clone()));
        if state.returns_no_user {
            return Ok(None);
        }
        state.session = Some(user.clone());
        Ok(Some(user))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Option<User>> {
        let mut state = lock(&self.state);
        Self::fail_if_set(&state)?;
        let user = match state.accounts.get(email) {
            Some((stored, user)) if stored == password => user.clone(),
            _ => {
                return Err(
                    StudymateError::Authentication("Invalid login credentials".to_string()).into(),
                )
            }
        };
        if state.returns_no_user {
            return Ok(None);
        }
        state.session = Some(user.clone());
        Ok(Some(user))
    }

    async fn sign_out(&self) -> Result<()> {
        let mut state = lock(&self.state);
        Self::fail_if_set(&state)?;
        state.session = None;
        Ok(())
    }

    async fn get_user(&self) -> Result<Option<User>> {
        let state = lock(&self.state);
        Self::fail_if_set(&state)?;
        Ok(state.session.clone())
    }
}

// ---------------------------------------------------------------------------
// ScriptedChatModel
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ChatScript {
    replies: VecDeque<std::result::Result<String, String>>,
    prompts: Vec<String>,
    instructions: Vec<String>,
    start_fails: bool,
}

/// Chat model that answers from a script
///
/// Replies are consumed in order; an empty script answers `"OK"`. A gate
/// can hold replies until the test releases them.
#[derive(Debug, Default)]
pub struct ScriptedChatModel {
    script: Arc<Mutex<ChatScript>>,
    gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl ScriptedChatModel {
    /// Empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply
    pub fn push_reply(&self, reply: &str) {
        lock(&self.script).replies.push_back(Ok(reply.to_string()));
    }

    /// Queue a failed reply
    pub fn push_error(&self, message: &str) {
        lock(&self.script).replies.push_back(Err(message.to_string()));
    }

    /// Make `start_chat` fail
    pub fn set_start_fails(&self, fails: bool) {
        lock(&self.script).start_fails = fails;
    }

    /// Hold every reply until the returned handle is notified
    pub fn hold_replies(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *lock(&self.gate) = Some(notify.clone());
        notify
    }

    /// Prompts received, across all sessions
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.script).prompts.clone()
    }

    /// System instructions of every session started
    pub fn system_instructions(&self) -> Vec<String> {
        lock(&self.script).instructions.clone()
    }
}

impl ChatModel for ScriptedChatModel {
    fn start_chat(&self, _model: &str, system_instruction: &str) -> Result<Box<dyn ChatSession>> {
        let mut script = lock(&self.script);
        if script.start_fails {
            return Err(StudymateError::Provider("model unavailable".to_string()).into());
        }
        script.instructions.push(system_instruction.to_string());
        Ok(Box::new(ScriptedChatSession {
            script: self.script.clone(),
            gate: self.gate.clone(),
        }))
    }
}

struct ScriptedChatSession {
    script: Arc<Mutex<ChatScript>>,
    gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

#[async_trait]
impl ChatSession for ScriptedChatSession {
    async fn send(&mut self, prompt: &str) -> Result<String> {
        lock(&self.script).prompts.push(prompt.to_string());
        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let reply = lock(&self.script).replies.pop_front();
        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(StudymateError::Provider(message).into()),
            None => Ok("OK".to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeLiveModel
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LiveState {
    sent_audio: Vec<AudioChunk>,
    tool_responses: Vec<FunctionResponse>,
    closes: usize,
    outbound_full: bool,
}

/// Live model whose events are injected by the test
#[derive(Debug, Default)]
pub struct FakeLiveModel {
    state: Arc<Mutex<LiveState>>,
    connect_failure: Mutex<Option<String>>,
    events: Mutex<Option<mpsc::Sender<LiveEvent>>>,
    last_config: Mutex<Option<LiveConfig>>,
}

impl FakeLiveModel {
    /// Model that accepts connections
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `connect` with `message`
    pub fn set_connect_failure(&self, message: Option<&str>) {
        *lock(&self.connect_failure) = message.map(str::to_string);
    }

    /// Reject outbound frames as if the queue were full
    pub fn set_outbound_full(&self, full: bool) {
        lock(&self.state).outbound_full = full;
    }

    /// Sender feeding the most recent connection's event stream
    pub fn events(&self) -> Option<mpsc::Sender<LiveEvent>> {
        lock(&self.events).clone()
    }

    /// Config of the most recent connection
    pub fn last_config(&self) -> Option<LiveConfig> {
        lock(&self.last_config).clone()
    }

    /// Audio chunks the client sent
    pub fn sent_audio(&self) -> Vec<AudioChunk> {
        lock(&self.state).sent_audio.clone()
    }

    /// Tool responses the client sent
    pub fn tool_responses(&self) -> Vec<FunctionResponse> {
        lock(&self.state).tool_responses.clone()
    }

    /// Number of `close` calls
    pub fn close_count(&self) -> usize {
        lock(&self.state).closes
    }
}

#[async_trait]
impl LiveModel for FakeLiveModel {
    async fn connect(&self, config: LiveConfig) -> Result<LiveConnection> {
        if let Some(message) = lock(&self.connect_failure).clone() {
            return Err(StudymateError::Provider(message).into());
        }
        *lock(&self.last_config) = Some(config);
        let (tx, rx) = mpsc::channel(64);
        *lock(&self.events) = Some(tx);
        Ok(LiveConnection {
            session: Box::new(FakeLiveSession {
                state: self.state.clone(),
            }),
            events: rx,
        })
    }
}

struct FakeLiveSession {
    state: Arc<Mutex<LiveState>>,
}

impl LiveSession for FakeLiveSession {
    fn send_realtime_input(&self, audio: AudioChunk) -> Result<()> {
        let mut state = lock(&self.state);
        if state.outbound_full {
            return Err(StudymateError::Voice("outbound queue full".to_string()).into());
        }
        state.sent_audio.push(audio);
        Ok(())
    }

    fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> Result<()> {
        lock(&self.state).tool_responses.extend(responses);
        Ok(())
    }

    fn close(&self) {
        lock(&self.state).closes += 1;
    }
}

// ---------------------------------------------------------------------------
// FakeAudioDevices
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct AudioState {
    deny_microphone: bool,
    capture_rate: Option<u32>,
    frames: Option<mpsc::Sender<Vec<f32>>>,
    microphone_stops: usize,
    now: f64,
    next_source: SourceId,
    played: Vec<(SourceId, f64, f64)>,
    stopped: Vec<SourceId>,
    outputs_closed: usize,
}

/// Audio hardware simulated in memory
#[derive(Debug, Default)]
pub struct FakeAudioDevices {
    state: Arc<Mutex<AudioState>>,
}

impl FakeAudioDevices {
    /// Devices that grant access
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse microphone permission
    pub fn deny_microphone(&self, deny: bool) {
        lock(&self.state).deny_microphone = deny;
    }

    /// Set the output clock
    pub fn set_time(&self, seconds: f64) {
        lock(&self.state).now = seconds;
    }

    /// Push a captured frame; `false` when capture is not running
    pub fn push_frame(&self, samples: Vec<f32>) -> bool {
        let sender = lock(&self.state).frames.clone();
        match sender {
            Some(tx) => tx.try_send(samples).is_ok(),
            None => false,
        }
    }

    /// Rate the capture graph was built at
    pub fn capture_rate(&self) -> Option<u32> {
        lock(&self.state).capture_rate
    }

    /// `(source, start, duration)` of every scheduled buffer
    pub fn played(&self) -> Vec<(SourceId, f64, f64)> {
        lock(&self.state).played.clone()
    }

    /// Sources stopped before finishing
    pub fn stopped(&self) -> Vec<SourceId> {
        lock(&self.state).stopped.clone()
    }

    /// Number of microphone stops
    pub fn microphone_stops(&self) -> usize {
        lock(&self.state).microphone_stops
    }

    /// Number of closed output contexts
    pub fn outputs_closed(&self) -> usize {
        lock(&self.state).outputs_closed
    }
}

#[async_trait]
impl AudioDevices for FakeAudioDevices {
    async fn request_microphone(&self) -> Result<Box<dyn Microphone>> {
        if lock(&self.state).deny_microphone {
            return Err(StudymateError::Voice("microphone permission denied".to_string()).into());
        }
        Ok(Box::new(FakeMicrophone {
            state: self.state.clone(),
        }))
    }

    fn open_output(&self, _sample_rate: u32) -> Result<Box<dyn AudioOutput>> {
        Ok(Box::new(FakeOutput {
            state: self.state.clone(),
        }))
    }
}

struct FakeMicrophone {
    state: Arc<Mutex<AudioState>>,
}

impl Microphone for FakeMicrophone {
    fn start(&mut self, sample_rate: u32) -> Result<mpsc::Receiver<Vec<f32>>> {
        let (tx, rx) = mpsc::channel(16);
        let mut state = lock(&self.state);
        state.capture_rate = Some(sample_rate);
        state.frames = Some(tx);
        Ok(rx)
    }

    fn stop(&mut self) {
        let mut state = lock(&self.state);
        state.frames = None;
        state.microphone_stops += 1;
    }
}

struct FakeOutput {
    state: Arc<Mutex<AudioState>>,
}

impl AudioOutput for FakeOutput {
    fn current_time(&self) -> f64 {
        lock(&self.state).now
    }

    fn play(&mut self, buffer: &AudioBuffer, start_at: f64) -> Result<SourceId> {
        let mut state = lock(&self.state);
        state.next_source += 1;
        let id = state.next_source;
        state.played.push((id, start_at, buffer.duration()));
        Ok(id)
    }

    fn stop(&mut self, source: SourceId) {
        lock(&self.state).stopped.push(source);
    }

    fn close(&mut self) {
        lock(&self.state).outputs_closed += 1;
    }
}
