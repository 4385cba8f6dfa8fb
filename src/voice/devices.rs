//! Audio device contracts
//!
//! The voice controller never touches hardware directly. A host supplies
//! [`AudioDevices`], which hands out a [`Microphone`] (capture context plus
//! processing node) and an [`AudioOutput`] (playback context).

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Identifier of one scheduled playback source
pub type SourceId = u64;

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    /// Samples per second
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Playback length in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Access to the host's audio hardware
#[async_trait]
pub trait AudioDevices: Send + Sync {
    /// Ask for microphone permission and return the capture device
    async fn request_microphone(&self) -> Result<Box<dyn Microphone>>;

    /// Open a playback context running at `sample_rate`
    fn open_output(&self, sample_rate: u32) -> Result<Box<dyn AudioOutput>>;
}

/// A granted microphone
pub trait Microphone: Send {
    /// Build the capture graph at `sample_rate`; frames arrive on the channel
    fn start(&mut self, sample_rate: u32) -> Result<mpsc::Receiver<Vec<f32>>>;

    /// Stop every track, disconnect the processing node and close the
    /// capture context
    fn stop(&mut self);
}

/// A playback context
pub trait AudioOutput: Send {
    /// Context clock in seconds
    fn current_time(&self) -> f64;

    /// Schedule `buffer` to start at `start_at` on the context clock
    fn play(&mut self, buffer: &AudioBuffer, start_at: f64) -> Result<SourceId>;

    /// Stop a scheduled or playing source
    fn stop(&mut self, source: SourceId);

    /// Close the context
    fn close(&mut self);
}
