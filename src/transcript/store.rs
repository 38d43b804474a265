use chrono::Utc;

use super::turn::{Correction, Speaker, Turn};

/// Append-only turn log
#[derive(Debug, Default)]
pub struct TranscriptStore {
    turns: Vec<Turn>,
    next_id: u64,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a finalized user utterance
    pub fn append_user(&mut self, text: impl Into<String>) -> &Turn {
        self.push(Speaker::User, text.into(), None)
    }

    /// Commit a tutor reply, with the correction it carried if any
    pub fn append_tutor(&mut self, text: impl Into<String>, correction: Option<Correction>) -> &Turn {
        self.push(Speaker::Tutor, text.into(), correction)
    }

    fn push(&mut self, speaker: Speaker, text: String, correction: Option<Correction>) -> &Turn {
        self.next_id += 1;
        self.turns.push(Turn {
            id: self.next_id,
            speaker,
            text,
            timestamp: Utc::now(),
            correction,
        });
        // just pushed
        &self.turns[self.turns.len() - 1]
    }

    /// Drop every turn. Ids keep counting up so they stay unique.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The last `window` turns that precede the turn at `end`
    pub fn window_before(&self, end: usize, window: usize) -> &[Turn] {
        let end = end.min(self.turns.len());
        let start = end.saturating_sub(window);
        &self.turns[start..end]
    }
}
