//! Model provider traits and common types
//!
//! This module defines the three seams the controllers use to reach the
//! hosted model service: [`ChatModel`] for text chat, [`ImageModel`] for
//! image generation and [`LiveModel`] for the streaming voice session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio::sync::mpsc;

use crate::error::Result;

/// Opens chat sessions against a hosted model
///
/// # Examples
///
/// ```no_run
/// use studymate::providers::{ChatModel, ChatSession};
/// use studymate::error::Result;
/// use async_trait::async_trait;
///
/// struct Echo;
/// struct EchoSession;
///
/// #[async_trait]
/// impl ChatSession for EchoSession {
///     async fn send(&mut self, prompt: &str) -> Result<String> {
///         Ok(prompt.to_string())
///     }
/// }
///
/// impl ChatModel for Echo {
///     fn start_chat(&self, _model: &str, _system: &str) -> Result<Box<dyn ChatSession>> {
///         Ok(Box::new(EchoSession))
///     }
/// }
/// ```
pub trait ChatModel: Send + Sync {
    /// Create a session for `model` primed with `system_instruction`
    fn start_chat(&self, model: &str, system_instruction: &str) -> Result<Box<dyn ChatSession>>;
}

/// A multi-turn chat session; the session owns its own history
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Send one prompt and wait for the full reply text
    async fn send(&mut self, prompt: &str) -> Result<String>;
}

/// Output aspect ratios supported by the image model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 1:1
    #[default]
    #[serde(rename = "1:1")]
    Square,
    /// 3:4
    #[serde(rename = "3:4")]
    Portrait,
    /// 4:3
    #[serde(rename = "4:3")]
    Landscape,
    /// 9:16
    #[serde(rename = "9:16")]
    Tall,
    /// 16:9
    #[serde(rename = "16:9")]
    Wide,
}

impl AspectRatio {
    /// Ratio as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Tall => "9:16",
            AspectRatio::Wide => "16:9",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "1:1" => Ok(AspectRatio::Square),
            "3:4" => Ok(AspectRatio::Portrait),
            "4:3" => Ok(AspectRatio::Landscape),
            "9:16" => Ok(AspectRatio::Tall),
            "16:9" => Ok(AspectRatio::Wide),
            other => Err(format!(
                "Unsupported aspect ratio: {} (expected 1:1, 3:4, 4:3, 9:16 or 16:9)",
                other
            )),
        }
    }
}

/// Image generation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageConfig {
    /// Number of images to generate
    pub number_of_images: u32,
    /// Requested output MIME type
    pub output_mime_type: String,
    /// Requested aspect ratio
    pub aspect_ratio: AspectRatio,
}

/// One generated image as returned by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// MIME type of the encoded image
    pub mime_type: String,
    /// Base64-encoded image bytes
    pub data: String,
}

/// Generates images from a prompt
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageModel: Send + Sync {
    /// Generate images for `prompt`
    async fn generate_images(
        &self,
        model: &str,
        prompt: &str,
        config: &ImageConfig,
    ) -> Result<Vec<ImagePayload>>;
}

/// Function exposed to the live model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// Function name
    pub name: String,
    /// What the function does, for the model
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: serde_json::Value,
}

/// Live session configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    /// Model identifier
    pub model: String,
    /// System instruction for the whole session
    pub system_instruction: String,
    /// Transcribe the user's speech
    pub input_transcription: bool,
    /// Transcribe the model's speech
    pub output_transcription: bool,
    /// Tools the model may call
    pub tools: Vec<FunctionDeclaration>,
    /// Outbound frames buffered before new ones are dropped
    pub outbound_capacity: usize,
}

/// A chunk of encoded audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioChunk {
    /// Base64-encoded audio bytes
    pub data: String,
    /// MIME type such as `audio/pcm;rate=16000`
    pub mime_type: String,
}

/// A function call requested by the live model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Correlation id echoed in the response
    #[serde(default)]
    pub id: String,
    /// Function name
    pub name: String,
    /// Arguments object
    #[serde(default)]
    pub args: serde_json::Value,
}

/// The client's answer to a [`FunctionCall`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    /// Id of the call being answered
    pub id: String,
    /// Function name
    pub name: String,
    /// Result object
    pub response: serde_json::Value,
}

/// One server message, already decoded from the wire format
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerMessage {
    /// Partial transcription of the user's speech
    pub input_transcription: Option<String>,
    /// Partial transcription of the model's speech
    pub output_transcription: Option<String>,
    /// The model finished its turn
    pub turn_complete: bool,
    /// The user barged in and the model stopped speaking
    pub interrupted: bool,
    /// Audio payloads to play, in order
    pub audio: Vec<AudioChunk>,
    /// Function calls to evaluate
    pub tool_calls: Vec<FunctionCall>,
}

/// Events delivered by a live session
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// The connection is open and input may be streamed
    Open,
    /// A server message arrived
    Message(ServerMessage),
    /// The transport failed
    Error(String),
    /// The remote side closed the session
    Close(Option<String>),
}

/// Handle to an open live session
///
/// Sends never wait for the network; they enqueue and return.
pub trait LiveSession: Send + Sync {
    /// Queue one chunk of microphone audio
    fn send_realtime_input(&self, audio: AudioChunk) -> Result<()>;

    /// Queue responses to function calls
    fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> Result<()>;

    /// Close the session; calling it more than once is harmless
    fn close(&self);
}

/// An open session plus the stream of its events
pub struct LiveConnection {
    /// Session handle
    pub session: Box<dyn LiveSession>,
    /// Events in arrival order; ends when the transport is gone
    pub events: mpsc::Receiver<LiveEvent>,
}

/// Opens streaming voice sessions
#[async_trait]
pub trait LiveModel: Send + Sync {
    /// Connect and start a session with `config`
    async fn connect(&self, config: LiveConfig) -> Result<LiveConnection>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_parse_and_display() {
        for ratio in ["1:1", "3:4", "4:3", "9:16", "16:9"] {
            let parsed: AspectRatio = ratio.parse().unwrap();
            assert_eq!(parsed.to_string(), ratio);
        }
        assert!("2:1".parse::<AspectRatio>().is_err());
        assert_eq!(AspectRatio::default(), AspectRatio::Square);
    }

    #[test]
    fn test_audio_chunk_serializes_camel_case() {
        let chunk = AudioChunk {
            data: "AAA=".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["mimeType"], "audio/pcm;rate=16000");
    }

    #[test]
    fn test_function_call_defaults() {
        let call: FunctionCall = serde_json::from_str(r#"{"name":"controlLight"}"#).unwrap();
        assert_eq!(call.id, "");
        assert!(call.args.is_null());
    }
}
