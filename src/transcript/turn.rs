use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Tutor,
}

/// A language error the tutor flagged in the preceding user turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    /// What the user said
    pub original: String,

    /// What they should have said
    pub corrected: String,

    /// Short reason, e.g. "subject-verb agreement"
    pub explanation: String,
}

/// One committed utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique and monotonic across the lifetime of a store
    pub id: u64,

    pub speaker: Speaker,

    /// Final utterance text
    pub text: String,

    pub timestamp: DateTime<Utc>,

    /// Only ever set on tutor turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<Correction>,
}

impl Turn {
    pub fn is_user(&self) -> bool {
        self.speaker == Speaker::User
    }
}
