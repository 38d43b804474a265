use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SessionError};
use crate::transcript::Turn;

/// Where the conversation loop currently is
///
/// At most one adapter operation is outstanding per state: capture in
/// `Listening`, the tutor exchange in `AwaitingReply`, playback (then the
/// settle delay) in `Speaking`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session; nothing running, wake lock released
    #[default]
    Inactive,
    /// Session running, waiting for the user to act
    Idle,
    Listening,
    AwaitingReply,
    Speaking,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        self != Self::Inactive
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inactive => "inactive",
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::AwaitingReply => "awaiting reply",
            Self::Speaking => "speaking",
        };
        f.write_str(name)
    }
}

/// Last error surfaced to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNotice {
    pub kind: ErrorKind,
    pub message: String,
    /// Fatal notices ended the session; the rest allow a retry
    pub fatal: bool,
    pub at: DateTime<Utc>,
}

impl From<&SessionError> for SessionNotice {
    fn from(err: &SessionError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            fatal: err.is_fatal(),
            at: Utc::now(),
        }
    }
}

/// Read-only view of the session published after every change
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub started_at: Option<DateTime<Utc>>,
    pub transcript: Vec<Turn>,
    /// Text being heard right now; never committed
    pub interim: String,
    pub notice: Option<SessionNotice>,
}

/// Text accumulated while capture is running
#[derive(Debug, Default)]
pub struct PendingUtterance {
    segments: Vec<String>,
    interim: String,
}

impl PendingUtterance {
    pub fn push_final(&mut self, segment: &str) {
        let segment = segment.trim();
        if !segment.is_empty() {
            self.segments.push(segment.to_string());
        }
        self.interim.clear();
    }

    pub fn set_interim(&mut self, text: &str) {
        self.interim = text.trim().to_string();
    }

    pub fn has_final(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Finalized text plus whatever is still in progress, for display
    pub fn preview(&self) -> String {
        let mut parts: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        if !self.interim.is_empty() {
            parts.push(&self.interim);
        }
        parts.join(" ")
    }

    /// Take the finalized text, dropping any interim remainder
    pub fn take_final(&mut self) -> String {
        let text = self.segments.join(" ");
        self.clear();
        text
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.interim.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interim_is_shown_but_never_taken() {
        let mut pending = PendingUtterance::default();
        pending.push_final("I are");
        pending.set_interim("happy tod");

        assert_eq!(pending.preview(), "I are happy tod");
        assert_eq!(pending.take_final(), "I are");
        assert_eq!(pending.preview(), "");
    }

    #[test]
    fn final_segment_replaces_interim() {
        let mut pending = PendingUtterance::default();
        pending.set_interim("hel");
        pending.push_final("hello");
        pending.push_final("  ");

        assert!(pending.has_final());
        assert_eq!(pending.preview(), "hello");
    }
}
