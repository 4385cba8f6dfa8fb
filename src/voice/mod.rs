//! Real-time voice assistant
//!
//! [`VoiceController`] drives one live session at a time:
//!
//! ```text
//! Idle -> Connecting -> Listening -> {Error, Closed} -> Idle
//! ```
//!
//! Starting requests the microphone, opens a playback context and connects
//! the live session. Capture begins when the session reports it is open.
//! Every exit path, whether a user toggle, a stream error, a remote close or
//! a failed start, runs the same teardown and lands in `Idle`.
//!
//! The controller is single-owner: the host calls [`VoiceController::run`]
//! (or feeds [`VoiceController::handle_event`] / [`VoiceController::handle_frame`]
//! itself) from one task.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::{GenaiConfig, VoiceConfig};
use crate::error::{Result, StudymateError};
use crate::notify::{NotificationLevel, Notifier};
use crate::providers::{
    AudioChunk, LiveConfig, LiveEvent, LiveModel, LiveSession, ServerMessage,
};

pub mod devices;
pub mod pcm;
pub mod playback;
pub mod tools;
pub mod transcript;

pub use devices::{AudioBuffer, AudioDevices, AudioOutput, Microphone, SourceId};
pub use playback::PlaybackScheduler;
pub use transcript::{TranscriptAssembler, TranscriptTurn};

/// Lifecycle of the voice session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Nothing is open
    Idle,
    /// Devices requested and the session is being negotiated
    Connecting,
    /// Audio is flowing both ways
    Listening,
    /// The stream failed; teardown follows immediately
    Error,
    /// The remote side closed; teardown follows immediately
    Closed,
}

/// Settings for one controller
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    /// Live model identifier
    pub model: String,
    /// System instruction for the session
    pub system_instruction: String,
    /// Capture sample rate
    pub input_sample_rate: u32,
    /// Playback sample rate
    pub output_sample_rate: u32,
    /// Outbound frames buffered before new ones are dropped
    pub outbound_capacity: usize,
}

impl VoiceSettings {
    /// Settings from configuration, with the instruction for `user_name`
    pub fn from_config(genai: &GenaiConfig, voice: &VoiceConfig, user_name: Option<&str>) -> Self {
        Self {
            model: genai.live_model.clone(),
            system_instruction: crate::prompts::voice_instruction(user_name),
            input_sample_rate: voice.input_sample_rate,
            output_sample_rate: voice.output_sample_rate,
            outbound_capacity: voice.outbound_queue_capacity,
        }
    }
}

/// Voice session state machine
pub struct VoiceController {
    live: Arc<dyn LiveModel>,
    devices: Arc<dyn AudioDevices>,
    notifier: Arc<dyn Notifier>,
    settings: VoiceSettings,
    state: VoiceState,
    session: Option<Box<dyn LiveSession>>,
    events: Option<mpsc::Receiver<LiveEvent>>,
    microphone: Option<Box<dyn Microphone>>,
    frames: Option<mpsc::Receiver<Vec<f32>>>,
    output: Option<Box<dyn AudioOutput>>,
    playback: PlaybackScheduler,
    transcript: TranscriptAssembler,
    frames_sent: u64,
    frames_dropped: u64,
}

enum Step {
    Event(Option<LiveEvent>),
    Frame(Option<Vec<f32>>),
}

impl VoiceController {
    /// Create an idle controller
    pub fn new(
        live: Arc<dyn LiveModel>,
        devices: Arc<dyn AudioDevices>,
        notifier: Arc<dyn Notifier>,
        settings: VoiceSettings,
    ) -> Self {
        Self {
            live,
            devices,
            notifier,
            settings,
            state: VoiceState::Idle,
            session: None,
            events: None,
            microphone: None,
            frames: None,
            output: None,
            playback: PlaybackScheduler::new(),
            transcript: TranscriptAssembler::new(),
            frames_sent: 0,
            frames_dropped: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// Transcript turns so far, oldest first
    pub fn transcript(&self) -> &[TranscriptTurn] {
        self.transcript.turns()
    }

    /// Sources currently tracked for playback
    pub fn active_sources(&self) -> usize {
        self.playback.active_sources()
    }

    /// Frames handed to the session and frames dropped because the
    /// outbound queue was full
    pub fn frame_counts(&self) -> (u64, u64) {
        (self.frames_sent, self.frames_dropped)
    }

    /// Start when idle, stop when connecting or listening
    pub async fn toggle(&mut self) {
        match self.state {
            VoiceState::Idle | VoiceState::Error | VoiceState::Closed => self.start().await,
            VoiceState::Connecting | VoiceState::Listening => self.stop(),
        }
    }

    /// Open devices and connect the live session
    ///
    /// Failures are reported through the notifier and followed by a full
    /// teardown; the controller never stays half-initialized.
    pub async fn start(&mut self) {
        if matches!(self.state, VoiceState::Connecting | VoiceState::Listening) {
            return;
        }
        self.state = VoiceState::Connecting;
        tracing::info!(model = %self.settings.model, "Starting voice session");

        if let Err(e) = self.connect().await {
            tracing::error!("Voice session failed to start: {}", e);
            self.notifier
                .notify(&format!("Could not start voice session: {}", e), NotificationLevel::Error);
            self.teardown();
        }
    }

    async fn connect(&mut self) -> Result<()> {
        let microphone = self.devices.request_microphone().await?;
        self.microphone = Some(microphone);

        let output = self.devices.open_output(self.settings.output_sample_rate)?;
        self.output = Some(output);

        let connection = self
            .live
            .connect(LiveConfig {
                model: self.settings.model.clone(),
                system_instruction: self.settings.system_instruction.clone(),
                input_transcription: true,
                output_transcription: true,
                tools: tools::declarations(),
                outbound_capacity: self.settings.outbound_capacity,
            })
            .await?;

        self.session = Some(connection.session);
        self.events = Some(connection.events);
        Ok(())
    }

    /// Stop and release everything; a no-op when idle
    pub fn stop(&mut self) {
        if self.state == VoiceState::Idle {
            return;
        }
        tracing::info!("Stopping voice session");
        self.teardown();
    }

    /// Apply one event from the live session
    pub fn handle_event(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::Open => self.on_open(),
            LiveEvent::Message(message) => self.on_message(message),
            LiveEvent::Error(reason) => {
                tracing::error!("Voice stream error: {}", reason);
                self.state = VoiceState::Error;
                self.notifier
                    .notify(&format!("Voice session error: {}", reason), NotificationLevel::Error);
                self.teardown();
            }
            LiveEvent::Close(reason) => {
                tracing::info!(reason = ?reason, "Voice session closed by remote");
                self.state = VoiceState::Closed;
                self.teardown();
            }
        }
    }

    fn on_open(&mut self) {
        if self.state != VoiceState::Connecting {
            return;
        }
        let rate = self.settings.input_sample_rate;
        let started = match self.microphone.as_mut() {
            Some(mic) => mic.start(rate),
            None => Err(StudymateError::Voice("microphone is not available".to_string()).into()),
        };
        match started {
            Ok(frames) => {
                self.frames = Some(frames);
                self.state = VoiceState::Listening;
                tracing::info!(sample_rate = rate, "Voice session listening");
            }
            Err(e) => {
                self.notifier
                    .notify(&format!("Could not start microphone: {}", e), NotificationLevel::Error);
                self.state = VoiceState::Error;
                self.teardown();
            }
        }
    }

    /// Encode one captured frame and queue it without waiting
    pub fn handle_frame(&mut self, samples: &[f32]) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if self.state != VoiceState::Listening {
            return;
        }
        let chunk = AudioChunk {
            data: pcm::encode_frame(samples),
            mime_type: pcm::pcm_mime_type(self.settings.input_sample_rate),
        };
        match session.send_realtime_input(chunk) {
            Ok(()) => self.frames_sent += 1,
            Err(e) => {
                self.frames_dropped += 1;
                tracing::debug!("Dropped audio frame: {}", e);
            }
        }
    }

    fn on_message(&mut self, message: ServerMessage) {
        if let Some(text) = message.input_transcription.as_deref() {
            self.transcript.push_input(text);
        }
        if let Some(text) = message.output_transcription.as_deref() {
            self.transcript.push_output(text);
        }
        if message.turn_complete {
            self.transcript.complete_turn();
        }
        if message.interrupted {
            self.stop_playback();
        }
        for chunk in &message.audio {
            if let Err(e) = self.play_chunk(chunk) {
                tracing::warn!("Skipped audio chunk: {}", e);
            }
        }
        if !message.tool_calls.is_empty() {
            let responses: Vec<_> = message
                .tool_calls
                .iter()
                .map(|call| tools::evaluate(call, self.notifier.as_ref()))
                .collect();
            if let Some(session) = self.session.as_ref() {
                if let Err(e) = session.send_tool_response(responses) {
                    tracing::warn!("Failed to send tool response: {}", e);
                }
            }
        }
    }

    fn play_chunk(&mut self, chunk: &AudioChunk) -> Result<()> {
        let Some(output) = self.output.as_mut() else {
            return Ok(());
        };
        let buffer = AudioBuffer {
            samples: pcm::decode_payload(&chunk.data)?,
            sample_rate: pcm::rate_from_mime(&chunk.mime_type)
                .unwrap_or(self.settings.output_sample_rate),
        };
        let now = output.current_time();
        self.playback.prune(now);
        let duration = buffer.duration();
        let start = self.playback.schedule(now, duration);
        let source = output.play(&buffer, start)?;
        self.playback.track(source, start + duration);
        Ok(())
    }

    fn stop_playback(&mut self) {
        let sources = self.playback.drain();
        if let Some(output) = self.output.as_mut() {
            for source in sources {
                output.stop(source);
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.events = None;
        if let Some(mut microphone) = self.microphone.take() {
            microphone.stop();
        }
        self.frames = None;
        self.stop_playback();
        if let Some(mut output) = self.output.take() {
            output.close();
        }
        self.transcript.reset_accumulators();
        self.state = VoiceState::Idle;
    }

    /// Process events and frames until the controller is idle again
    pub async fn run(&mut self) {
        while self.state != VoiceState::Idle {
            if !self.step().await {
                break;
            }
        }
    }

    /// Process one event or frame; returns `false` when nothing can arrive
    pub async fn step(&mut self) -> bool {
        if self.events.is_none() && self.frames.is_none() {
            return false;
        }
        let step = tokio::select! {
            biased;
            event = recv_or_pending(&mut self.events) => Step::Event(event),
            frame = recv_or_pending(&mut self.frames) => Step::Frame(frame),
        };
        match step {
            Step::Event(Some(event)) => self.handle_event(event),
            Step::Event(None) => {
                self.handle_event(LiveEvent::Close(Some("event stream ended".to_string())))
            }
            Step::Frame(Some(frame)) => self.handle_frame(&frame),
            Step::Frame(None) => self.frames = None,
        }
        true
    }
}

impl Drop for VoiceController {
    fn drop(&mut self) {
        if self.state != VoiceState::Idle {
            self.teardown();
        }
    }
}

async fn recv_or_pending<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeAudioDevices, FakeLiveModel};
    use crate::notify::NotificationCenter;
    use crate::providers::FunctionCall;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use std::time::Duration;

    struct Harness {
        controller: VoiceController,
        live: Arc<FakeLiveModel>,
        devices: Arc<FakeAudioDevices>,
        notices: Arc<NotificationCenter>,
    }

    fn harness() -> Harness {
        let live = Arc::new(FakeLiveModel::new());
        let devices = Arc::new(FakeAudioDevices::new());
        let notices = Arc::new(NotificationCenter::new(Duration::from_secs(3)));
        let settings = VoiceSettings {
            model: "live-model".to_string(),
            system_instruction: "be brief".to_string(),
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            outbound_capacity: 4,
        };
        let controller =
            VoiceController::new(live.clone(), devices.clone(), notices.clone(), settings);
        Harness {
            controller,
            live,
            devices,
            notices,
        }
    }

    fn audio(samples: usize) -> AudioChunk {
        AudioChunk {
            data: STANDARD.encode(vec![0u8; samples * 2]),
            mime_type: "audio/pcm;rate=24000".to_string(),
        }
    }

    async fn listening(h: &mut Harness) {
        h.controller.toggle().await;
        assert_eq!(h.controller.state(), VoiceState::Connecting);
        h.controller.handle_event(LiveEvent::Open);
        assert_eq!(h.controller.state(), VoiceState::Listening);
    }

    #[test]
    fn test_settings_from_config() {
        let config = crate::config::Config::default();
        let settings = VoiceSettings::from_config(&config.genai, &config.voice, Some("Ada"));

        assert_eq!(settings.model, config.genai.live_model);
        assert_eq!(settings.input_sample_rate, 16_000);
        assert_eq!(settings.output_sample_rate, 24_000);
        assert_eq!(settings.outbound_capacity, 64);
        assert!(settings.system_instruction.contains("Ada"));
    }

    #[tokio::test]
    async fn test_start_configures_session() {
        let mut h = harness();
        listening(&mut h).await;

        let config = h.live.last_config().unwrap();
        assert!(config.input_transcription && config.output_transcription);
        assert_eq!(config.tools[0].name, tools::CONTROL_LIGHT);
        assert_eq!(h.devices.capture_rate(), Some(16_000));
    }

    #[tokio::test]
    async fn test_frames_are_encoded_and_sent() {
        let mut h = harness();
        listening(&mut h).await;

        h.controller.handle_frame(&[0.0, 1.0]);
        let sent = h.live.sent_audio();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].mime_type, "audio/pcm;rate=16000");
        assert_eq!(STANDARD.decode(&sent[0].data).unwrap(), vec![0, 0, 0xFF, 0x7F]);
    }

    #[tokio::test]
    async fn test_full_outbound_queue_drops_frames() {
        let mut h = harness();
        listening(&mut h).await;
        h.live.set_outbound_full(true);

        h.controller.handle_frame(&[0.1]);
        assert_eq!(h.controller.frame_counts(), (0, 1));
        assert_eq!(h.controller.state(), VoiceState::Listening);
    }

    #[tokio::test]
    async fn test_audio_scheduled_back_to_back() {
        let mut h = harness();
        listening(&mut h).await;
        h.devices.set_time(2.0);

        h.controller.handle_event(LiveEvent::Message(ServerMessage {
            audio: vec![audio(12_000), audio(24_000)],
            ..Default::default()
        }));

        let played = h.devices.played();
        assert_eq!(played.len(), 2);
        assert_eq!(played[0].1, 2.0);
        assert!(played[1].1 >= played[0].1 + 0.5);
        assert_eq!(h.controller.active_sources(), 2);
    }

    #[tokio::test]
    async fn test_interrupted_stops_playback() {
        let mut h = harness();
        listening(&mut h).await;
        h.controller.handle_event(LiveEvent::Message(ServerMessage {
            audio: vec![audio(24_000)],
            ..Default::default()
        }));
        h.controller.handle_event(LiveEvent::Message(ServerMessage {
            interrupted: true,
            ..Default::default()
        }));

        assert_eq!(h.controller.active_sources(), 0);
        assert_eq!(h.devices.stopped().len(), 1);
        assert_eq!(h.controller.state(), VoiceState::Listening);
    }

    #[tokio::test]
    async fn test_tool_call_notifies_and_responds() {
        let mut h = harness();
        listening(&mut h).await;
        h.controller.handle_event(LiveEvent::Message(ServerMessage {
            tool_calls: vec![FunctionCall {
                id: "fc-7".to_string(),
                name: tools::CONTROL_LIGHT.to_string(),
                args: serde_json::json!({"on": true}),
            }],
            ..Default::default()
        }));

        let responses = h.live.tool_responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, "fc-7");
        assert_eq!(h.notices.active()[0].message, "Light turned on");
    }

    #[tokio::test]
    async fn test_error_event_tears_down() {
        let mut h = harness();
        listening(&mut h).await;
        h.controller.handle_event(LiveEvent::Message(ServerMessage {
            audio: vec![audio(100)],
            ..Default::default()
        }));

        h.controller.handle_event(LiveEvent::Error("socket reset".to_string()));

        assert_eq!(h.controller.state(), VoiceState::Idle);
        assert_eq!(h.live.close_count(), 1);
        assert_eq!(h.devices.microphone_stops(), 1);
        assert_eq!(h.devices.outputs_closed(), 1);
        assert_eq!(h.controller.active_sources(), 0);
        assert!(h.notices.active()[0].message.contains("socket reset"));
    }

    #[tokio::test]
    async fn test_denied_microphone_lands_idle() {
        let mut h = harness();
        h.devices.deny_microphone(true);
        h.controller.toggle().await;

        assert_eq!(h.controller.state(), VoiceState::Idle);
        assert!(h.live.last_config().is_none());
        assert_eq!(h.notices.active().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_releases_devices() {
        let mut h = harness();
        h.live.set_connect_failure(Some("quota exceeded"));
        h.controller.toggle().await;

        assert_eq!(h.controller.state(), VoiceState::Idle);
        assert_eq!(h.devices.microphone_stops(), 1);
        assert_eq!(h.devices.outputs_closed(), 1);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let mut h = harness();
        h.controller.stop();
        h.controller.stop();
        assert_eq!(h.controller.state(), VoiceState::Idle);
        assert_eq!(h.live.close_count(), 0);
    }

    #[tokio::test]
    async fn test_toggle_twice_stops() {
        let mut h = harness();
        listening(&mut h).await;
        h.controller.toggle().await;
        assert_eq!(h.controller.state(), VoiceState::Idle);
        assert_eq!(h.live.close_count(), 1);
    }

    #[tokio::test]
    async fn test_run_drives_events_until_close() {
        let mut h = harness();
        h.controller.toggle().await;
        let events = h.live.events().unwrap();
        events.send(LiveEvent::Open).await.unwrap();
        events
            .send(LiveEvent::Message(ServerMessage {
                input_transcription: Some("Hi".to_string()),
                turn_complete: true,
                ..Default::default()
            }))
            .await
            .unwrap();
        events.send(LiveEvent::Close(None)).await.unwrap();

        h.controller.run().await;

        assert_eq!(h.controller.state(), VoiceState::Idle);
        assert_eq!(h.controller.transcript()[0].user, "Hi");
        assert!(h.controller.transcript()[0].is_final);
    }
}
