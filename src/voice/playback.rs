//! Gapless playback scheduling

use super::devices::SourceId;

/// Running playback cursor plus the set of live sources
///
/// Each chunk starts at the later of "now" and the end of the previously
/// scheduled chunk.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    cursor: f64,
    sources: Vec<(SourceId, f64)>,
}

impl PlaybackScheduler {
    /// Empty scheduler with the cursor at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `duration` seconds of playback and return the start time
    pub fn schedule(&mut self, now: f64, duration: f64) -> f64 {
        let start = now.max(self.cursor);
        self.cursor = start + duration.max(0.0);
        start
    }

    /// Track a source that ends at `ends_at`
    pub fn track(&mut self, source: SourceId, ends_at: f64) {
        self.sources.push((source, ends_at));
    }

    /// Forget sources that finished before `now`
    pub fn prune(&mut self, now: f64) {
        self.sources.retain(|(_, ends_at)| *ends_at > now);
    }

    /// Take every tracked source and reset the cursor
    pub fn drain(&mut self) -> Vec<SourceId> {
        self.cursor = 0.0;
        self.sources.drain(..).map(|(id, _)| id).collect()
    }

    /// End of the last scheduled chunk
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Number of tracked sources
    pub fn active_sources(&self) -> usize {
        self.sources.len()
    }
}
