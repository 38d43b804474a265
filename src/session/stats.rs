use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{SessionSnapshot, SessionState};

/// Statistics about a tutoring session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: SessionState,

    /// Whether a session is currently running
    pub is_active: bool,

    /// When the session started
    pub started_at: Option<DateTime<Utc>>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Committed turns, both speakers
    pub turns_count: usize,

    /// Tutor turns carrying a correction
    pub corrections_count: usize,
}

impl SessionStats {
    pub fn from_snapshot(session_id: &str, snapshot: &SessionSnapshot) -> Self {
        let duration_secs = snapshot
            .started_at
            .map(|started| Utc::now().signed_duration_since(started).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        Self {
            session_id: session_id.to_string(),
            state: snapshot.state,
            is_active: snapshot.state.is_active(),
            started_at: snapshot.started_at,
            duration_secs,
            turns_count: snapshot.transcript.len(),
            corrections_count: snapshot
                .transcript
                .iter()
                .filter(|turn| turn.correction.is_some())
                .count(),
        }
    }
}
