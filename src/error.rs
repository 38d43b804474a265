//! Error taxonomy for the tutoring session
//!
//! Adapter errors are split by collaborator so the controller can decide per
//! kind whether a failure ends the session or only the current turn.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionState;

/// Failures reported by a capture adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The platform refused microphone access
    #[error("microphone permission denied")]
    PermissionDenied,

    /// No speech-to-text engine is available
    #[error("speech capture unsupported: {0}")]
    Unsupported(String),

    /// The engine finished without hearing any speech
    #[error("no speech detected")]
    NoSpeech,

    /// Any other engine failure
    #[error("capture failed: {0}")]
    Failed(String),
}

/// Failures of the tutor exchange. All of them are recoverable.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    #[error("tutor request failed: {0}")]
    Network(String),

    #[error("tutor returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not parse tutor reply: {0}")]
    Parse(String),

    #[error("tutor did not reply within {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Failures of speech playback. The controller treats these as completion.
#[derive(Debug, Clone, Error)]
pub enum SynthesisError {
    #[error("speech synthesis unavailable: {0}")]
    Unavailable(String),

    #[error("speech synthesis failed: {0}")]
    Failed(String),
}

/// Errors returned from the session controller's public operations
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("speech capture unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Capture(CaptureError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("no session is active")]
    NotActive,

    #[error("session is busy ({0})")]
    Busy(SessionState),

    #[error("no failed exchange to retry")]
    NothingToRetry,

    #[error("session controller has shut down")]
    Closed,
}

impl SessionError {
    /// Fatal errors end the session and need action outside the app
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::Unsupported(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Capture(_) => ErrorKind::Capture,
            Self::Exchange(ExchangeError::Timeout(_)) => ErrorKind::Timeout,
            Self::Exchange(_) => ErrorKind::Exchange,
            Self::NotActive | Self::Busy(_) | Self::NothingToRetry | Self::Closed => {
                ErrorKind::InvalidState
            }
        }
    }
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => Self::PermissionDenied,
            CaptureError::Unsupported(msg) => Self::Unsupported(msg),
            other => Self::Capture(other),
        }
    }
}

/// Coarse error category surfaced to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    Unsupported,
    Capture,
    Exchange,
    Timeout,
    InvalidState,
}
