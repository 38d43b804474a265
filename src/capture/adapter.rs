use tokio::sync::mpsc;

use crate::error::CaptureError;

/// Events emitted by one capture instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Transcript in progress; replaces the previous interim text
    Interim(String),

    /// A finalized segment, appended to the pending utterance
    Final(String),

    /// The engine detected the end of the utterance (terminal)
    EndOfSpeech,

    /// The engine stopped without hearing anything (terminal)
    NoSpeech,

    /// The engine failed (terminal)
    Error(CaptureError),
}

impl CaptureEvent {
    /// Whether this event ends the capture instance
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::EndOfSpeech | Self::NoSpeech | Self::Error(_))
    }
}

/// Speech-to-text engine wrapper
///
/// Implementations:
/// - [`super::NatsCapture`]: loqa STT service over NATS
/// - scripted fakes in tests
#[async_trait::async_trait]
pub trait CaptureAdapter: Send + Sync {
    /// Begin listening
    ///
    /// Returns the event receiver for this instance. The stream carries at
    /// most one terminal event. Fails with [`CaptureError::PermissionDenied`]
    /// or [`CaptureError::Unsupported`] when listening cannot begin.
    async fn start(&self) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError>;

    /// Stop listening. A no-op when not listening.
    async fn stop(&self);

    /// Adapter name for logging
    fn name(&self) -> &str;
}
