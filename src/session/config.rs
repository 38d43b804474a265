use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When a capture instance counts as a finished utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointPolicy {
    /// Wait for the capture engine's own end-of-speech signal
    AdapterSignal,
    /// Finalize after this much quiet following a finalized segment
    SilenceDebounce(Duration),
}

/// Configuration for a tutoring session controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "tutor-5f0c...")
    pub session_id: String,

    /// Pause between the end of speech playback and the next capture, so
    /// the recognizer does not hear the tail of the device's own voice.
    /// Default: 600ms
    pub settle_delay: Duration,

    /// Upper bound on waiting for the tutor; `None` waits forever.
    /// Default: 30 seconds
    pub reply_timeout: Option<Duration>,

    /// Prior turns passed to the tutor with each utterance
    pub history_window: usize,

    pub endpoint: EndpointPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("tutor-{}", uuid::Uuid::new_v4()),
            settle_delay: Duration::from_millis(600),
            reply_timeout: Some(Duration::from_secs(30)),
            history_window: 10,
            endpoint: EndpointPolicy::AdapterSignal,
        }
    }
}
