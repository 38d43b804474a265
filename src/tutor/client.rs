use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;
use crate::transcript::{Correction, Turn};

/// Tutor answer for one user utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorReply {
    pub reply: String,

    /// Set when the utterance contained a language error
    #[serde(default)]
    pub correction: Option<Correction>,
}

impl TutorReply {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            correction: None,
        }
    }

    pub fn with_correction(mut self, correction: Correction) -> Self {
        self.correction = Some(correction);
        self
    }
}

/// Remote tutor
#[async_trait::async_trait]
pub trait TutorClient: Send + Sync {
    /// Reply to `utterance` given the turns that preceded it
    ///
    /// `history` is already bounded by the controller; implementations may
    /// drop more of it to bound payload size.
    async fn exchange(&self, history: &[Turn], utterance: &str) -> Result<TutorReply, ExchangeError>;
}
