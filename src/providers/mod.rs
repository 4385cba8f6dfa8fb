//! Hosted model providers
//!
//! Traits for the three model capabilities the client uses and their
//! implementations against the hosted generative-AI service.

pub mod base;
pub mod gemini;
pub mod gemini_live;

pub use base::{
    AspectRatio, AudioChunk, ChatModel, ChatSession, FunctionCall, FunctionDeclaration,
    FunctionResponse, ImageConfig, ImageModel, ImagePayload, LiveConfig, LiveConnection,
    LiveEvent, LiveModel, LiveSession, ServerMessage,
};
#[cfg(test)]
pub use base::MockImageModel;
pub use gemini::GeminiClient;
pub use gemini_live::GeminiLive;
