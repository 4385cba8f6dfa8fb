//! Incremental transcript assembly
//!
//! The live session streams transcription in fragments. Fragments are
//! appended to per-side accumulators and mirrored into the open turn; a
//! turn-complete signal seals the turn and resets both accumulators.

use serde::Serialize;

/// One sealed or open unit of voice transcript
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranscriptTurn {
    /// What the user has said so far
    pub user: String,
    /// What the model has said so far
    pub model: String,
    /// Set once the turn is complete
    pub is_final: bool,
}

/// Builds turns out of partial transcription events
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    turns: Vec<TranscriptTurn>,
    user_text: String,
    model_text: String,
}

impl TranscriptAssembler {
    /// Empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment of the user's speech
    pub fn push_input(&mut self, fragment: &str) {
        self.user_text.push_str(fragment);
        let text = self.user_text.clone();
        self.open_turn().user = text;
    }

    /// Append a fragment of the model's speech
    pub fn push_output(&mut self, fragment: &str) {
        self.model_text.push_str(fragment);
        let text = self.model_text.clone();
        self.open_turn().model = text;
    }

    /// Seal the open turn and reset both accumulators
    pub fn complete_turn(&mut self) {
        if let Some(turn) = self.turns.last_mut() {
            turn.is_final = true;
        }
        self.reset_accumulators();
    }

    /// Drop partial text without touching recorded turns
    pub fn reset_accumulators(&mut self) {
        self.user_text.clear();
        self.model_text.clear();
    }

    /// All turns, oldest first
    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    fn open_turn(&mut self) -> &mut TranscriptTurn {
        let needs_new = self.turns.last().map_or(true, |t| t.is_final);
        if needs_new {
            self.turns.push(TranscriptTurn::default());
        }
        let last = self.turns.len() - 1;
        &mut self.turns[last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_build_one_final_turn() {
        let mut transcript = TranscriptAssembler::new();
        transcript.push_input("Hel");
        transcript.push_input("lo");
        transcript.complete_turn();

        assert_eq!(
            transcript.turns(),
            &[TranscriptTurn {
                user: "Hello".to_string(),
                model: String::new(),
                is_final: true,
            }]
        );
    }

    #[test]
    fn test_model_text_joins_open_turn() {
        let mut transcript = TranscriptAssembler::new();
        transcript.push_input("What is pi?");
        transcript.push_output("About ");
        transcript.push_output("3.14");

        let turns = transcript.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].user, "What is pi?");
        assert_eq!(turns[0].model, "About 3.14");
        assert!(!turns[0].is_final);
    }

    #[test]
    fn test_new_turn_only_after_final() {
        let mut transcript = TranscriptAssembler::new();
        transcript.push_input("one");
        transcript.complete_turn();
        transcript.push_input("two");
        transcript.push_input(" more");

        let turns = transcript.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].user, "two more");
        assert!(turns[0].is_final);
    }

    #[test]
    fn test_complete_without_turns_is_noop() {
        let mut transcript = TranscriptAssembler::new();
        transcript.complete_turn();
        assert!(transcript.turns().is_empty());
    }
}
