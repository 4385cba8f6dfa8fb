//! Live voice sessions over the bidirectional streaming WebSocket
//!
//! A connection runs two tasks. The writer drains a bounded outbound queue
//! into the socket; the reader decodes server frames into [`LiveEvent`]s.
//! Sends from the controller only enqueue, so audio capture never waits on
//! the network. When the queue is full the frame is rejected and the caller
//! decides whether to drop it.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use crate::config::GenaiConfig;
use crate::error::{Result, StudymateError};
use crate::providers::base::{
    AudioChunk, FunctionCall, FunctionResponse, LiveConfig, LiveConnection, LiveEvent, LiveModel,
    LiveSession, ServerMessage,
};

const EVENT_QUEUE: usize = 64;

/// Live model reached through the streaming endpoint
#[derive(Debug, Clone)]
pub struct GeminiLive {
    live_url: String,
    api_key: String,
}

impl GeminiLive {
    /// Client for the endpoint at `live_url`
    pub fn new(live_url: &str, api_key: &str) -> Self {
        Self {
            live_url: live_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Client for the configured service
    pub fn from_config(config: &GenaiConfig) -> Self {
        Self::new(&config.live_url, &config.api_key)
    }

    fn session_url(&self) -> Result<String> {
        let mut url = url::Url::parse(&self.live_url)
            .map_err(|e| StudymateError::Config(format!("invalid live url: {}", e)))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url.to_string())
    }
}

enum Outbound {
    Frame(String),
    Close,
}

#[async_trait]
impl LiveModel for GeminiLive {
    async fn connect(&self, config: LiveConfig) -> Result<LiveConnection> {
        let url = self.session_url()?;
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| StudymateError::WebSocket(format!("connect failed: {}", e)))?;
        let (mut sink, mut stream) = socket.split();

        sink.send(Message::Text(setup_message(&config).to_string().into()))
            .await
            .map_err(|e| StudymateError::WebSocket(format!("setup failed: {}", e)))?;
        tracing::info!(model = %config.model, "Live session negotiating");

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(config.outbound_capacity.max(1));
        let (event_tx, event_rx) = mpsc::channel::<LiveEvent>(EVENT_QUEUE);

        let writer = tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                match outbound {
                    Outbound::Frame(text) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            tracing::warn!("Live session write failed: {}", e);
                            break;
                        }
                    }
                    Outbound::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        let reader = tokio::spawn(async move {
            let closing = loop {
                let frame = match stream.next().await {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => break LiveEvent::Error(e.to_string()),
                    None => break LiveEvent::Close(None),
                };
                let value: Value = match &frame {
                    Message::Text(text) => match serde_json::from_str(text.as_str()) {
                        Ok(value) => value,
                        Err(e) => {
                            tracing::debug!("Ignoring undecodable frame: {}", e);
                            continue;
                        }
                    },
                    Message::Binary(data) => match serde_json::from_slice(data) {
                        Ok(value) => value,
                        Err(e) => {
                            tracing::debug!("Ignoring undecodable frame: {}", e);
                            continue;
                        }
                    },
                    Message::Close(close) => {
                        break LiveEvent::Close(close.as_ref().map(|c| c.reason.as_str().to_string()))
                    }
                    _ => continue,
                };
                let Some(event) = decode_server_event(&value) else {
                    continue;
                };
                if event_tx.send(event).await.is_err() {
                    return;
                }
            };
            let _ = event_tx.send(closing).await;
        });

        Ok(LiveConnection {
            session: Box::new(GeminiLiveSession {
                outbound: outbound_tx,
                closed: AtomicBool::new(false),
                writer,
                reader,
            }),
            events: event_rx,
        })
    }
}

struct GeminiLiveSession {
    outbound: mpsc::Sender<Outbound>,
    closed: AtomicBool,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl GeminiLiveSession {
    fn enqueue(&self, message: Value) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StudymateError::Voice("session is closed".to_string()).into());
        }
        self.outbound
            .try_send(Outbound::Frame(message.to_string()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    StudymateError::Voice("outbound queue full".to_string()).into()
                }
                mpsc::error::TrySendError::Closed(_) => {
                    StudymateError::Voice("session is closed".to_string()).into()
                }
            })
    }
}

impl LiveSession for GeminiLiveSession {
    fn send_realtime_input(&self, audio: AudioChunk) -> Result<()> {
        self.enqueue(realtime_input_message(&audio))
    }

    fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> Result<()> {
        self.enqueue(tool_response_message(&responses))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.outbound.try_send(Outbound::Close).is_err() {
            self.writer.abort();
        }
        self.reader.abort();
        tracing::info!("Live session closed");
    }
}

impl Drop for GeminiLiveSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// First frame of every session
pub fn setup_message(config: &LiveConfig) -> Value {
    let mut setup = json!({
        "model": format!("models/{}", config.model.trim_start_matches("models/")),
        "generationConfig": { "responseModalities": ["AUDIO"] },
        "systemInstruction": { "parts": [{ "text": config.system_instruction }] },
    });
    if !config.tools.is_empty() {
        setup["tools"] = json!([{ "functionDeclarations": config.tools }]);
    }
    if config.input_transcription {
        setup["inputAudioTranscription"] = json!({});
    }
    if config.output_transcription {
        setup["outputAudioTranscription"] = json!({});
    }
    json!({ "setup": setup })
}

/// Frame carrying one chunk of microphone audio
pub fn realtime_input_message(audio: &AudioChunk) -> Value {
    json!({ "realtimeInput": { "audio": audio } })
}

/// Frame answering function calls
pub fn tool_response_message(responses: &[FunctionResponse]) -> Value {
    json!({ "toolResponse": { "functionResponses": responses } })
}

/// Maps one decoded server frame to an event; `None` for frames the
/// controller does not care about
pub fn decode_server_event(value: &Value) -> Option<LiveEvent> {
    if value.get("setupComplete").is_some() {
        return Some(LiveEvent::Open);
    }
    if let Some(go_away) = value.get("goAway") {
        tracing::info!(time_left = %go_away["timeLeft"], "Live session ending soon");
        return None;
    }

    let mut message = ServerMessage::default();
    let mut relevant = false;

    if let Some(content) = value.get("serverContent") {
        relevant = true;
        message.input_transcription = content["inputTranscription"]["text"]
            .as_str()
            .map(str::to_string);
        message.output_transcription = content["outputTranscription"]["text"]
            .as_str()
            .map(str::to_string);
        message.turn_complete = content["turnComplete"].as_bool().unwrap_or(false);
        message.interrupted = content["interrupted"].as_bool().unwrap_or(false);
        if let Some(parts) = content["modelTurn"]["parts"].as_array() {
            message.audio = parts
                .iter()
                .filter_map(|part| serde_json::from_value::<AudioChunk>(part["inlineData"].clone()).ok())
                .collect();
        }
    }

    if let Some(calls) = value["toolCall"]["functionCalls"].as_array() {
        relevant = true;
        message.tool_calls = calls
            .iter()
            .filter_map(|call| serde_json::from_value::<FunctionCall>(call.clone()).ok())
            .collect();
    }

    relevant.then(|| LiveEvent::Message(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::base::FunctionDeclaration;

    fn config() -> LiveConfig {
        LiveConfig {
            model: "gemini-live".to_string(),
            system_instruction: "be brief".to_string(),
            input_transcription: true,
            output_transcription: false,
            tools: vec![FunctionDeclaration {
                name: "controlLight".to_string(),
                description: "light".to_string(),
                parameters: json!({"type": "OBJECT"}),
            }],
            outbound_capacity: 8,
        }
    }

    #[test]
    fn test_setup_message_shape() {
        let setup = setup_message(&config());
        assert_eq!(setup["setup"]["model"], "models/gemini-live");
        assert_eq!(setup["setup"]["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            setup["setup"]["tools"][0]["functionDeclarations"][0]["name"],
            "controlLight"
        );
        assert!(setup["setup"].get("inputAudioTranscription").is_some());
        assert!(setup["setup"].get("outputAudioTranscription").is_none());
    }

    #[test]
    fn test_realtime_input_message_shape() {
        let frame = realtime_input_message(&AudioChunk {
            data: "AAA=".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        });
        assert_eq!(frame["realtimeInput"]["audio"]["mimeType"], "audio/pcm;rate=16000");
    }

    #[test]
    fn test_decode_setup_complete() {
        assert_eq!(decode_server_event(&json!({"setupComplete": {}})), Some(LiveEvent::Open));
    }

    #[test]
    fn test_decode_server_content() {
        let event = decode_server_event(&json!({
            "serverContent": {
                "inputTranscription": {"text": "Hel"},
                "modelTurn": {"parts": [
                    {"inlineData": {"data": "AAAA", "mimeType": "audio/pcm;rate=24000"}},
                    {"text": "ignored"}
                ]},
                "turnComplete": true
            }
        }));
        let Some(LiveEvent::Message(message)) = event else {
            panic!("expected a message");
        };
        assert_eq!(message.input_transcription.as_deref(), Some("Hel"));
        assert!(message.output_transcription.is_none());
        assert!(message.turn_complete);
        assert_eq!(message.audio.len(), 1);
    }

    #[test]
    fn test_decode_tool_call() {
        let event = decode_server_event(&json!({
            "toolCall": {"functionCalls": [{"id": "fc1", "name": "controlLight", "args": {"on": true}}]}
        }));
        let Some(LiveEvent::Message(message)) = event else {
            panic!("expected a message");
        };
        assert_eq!(message.tool_calls[0].id, "fc1");
        assert_eq!(message.tool_calls[0].args["on"], true);
    }

    #[test]
    fn test_decode_ignores_unknown_frames() {
        assert!(decode_server_event(&json!({"usageMetadata": {}})).is_none());
        assert!(decode_server_event(&json!({"goAway": {"timeLeft": "5s"}})).is_none());
    }

    #[test]
    fn test_session_url_appends_key() {
        let live = GeminiLive::new("wss://example.com/ws/Live", "k 1");
        assert_eq!(live.session_url().unwrap(), "wss://example.com/ws/Live?key=k+1");
    }

    #[test]
    fn test_from_config_uses_live_url() {
        let mut genai = GenaiConfig::default();
        genai.live_url = "wss://live.test/ws".to_string();
        genai.api_key = "abc".to_string();
        let live = GeminiLive::from_config(&genai);
        assert_eq!(live.session_url().unwrap(), "wss://live.test/ws?key=abc");
    }
}
