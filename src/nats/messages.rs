use serde::{Deserialize, Serialize};

/// Audio frame message published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    /// Capture instance the frame belongs to
    pub capture_id: u64,
    pub sequence: u32,
    pub pcm: String, // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Start/stop request for the STT service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureAction {
    Start,
    Stop,
}

/// Capture control message published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct CaptureControlMessage {
    pub session_id: String,
    pub capture_id: u64,
    pub action: CaptureAction,
    /// True when audio comes from the remote audio node's microphone
    pub remote_audio: bool,
    pub timestamp: String,
}

/// Transcript message received from STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    #[serde(default)]
    pub capture_id: Option<u64>,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Set on the last message of an utterance
    #[serde(default)]
    pub end_of_speech: bool,
}

/// Error kinds the STT service reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureErrorKind {
    PermissionDenied,
    Unsupported,
    NoSpeech,
    Failed,
}

/// Capture error message received from STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct CaptureErrorMessage {
    pub session_id: String,
    #[serde(default)]
    pub capture_id: Option<u64>,
    pub kind: CaptureErrorKind,
    #[serde(default)]
    pub message: String,
}

/// Speech request published to the TTS service
#[derive(Debug, Serialize, Deserialize)]
pub struct SpeakRequest {
    pub session_id: String,
    pub utterance_id: u64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    pub rate: f32,
    /// Inaudible request that unlocks audio output
    #[serde(default)]
    pub priming: bool,
}

/// Playback lifecycle reported by the TTS service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechEventKind {
    Started,
    Completed,
    Failed,
}

/// Playback event received from the TTS service
#[derive(Debug, Serialize, Deserialize)]
pub struct SpeechEventMessage {
    pub session_id: String,
    pub utterance_id: u64,
    pub event: SpeechEventKind,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Cancels playback; `utterance_id = None` cancels everything queued
#[derive(Debug, Serialize, Deserialize)]
pub struct SpeechCancelMessage {
    pub session_id: String,
    #[serde(default)]
    pub utterance_id: Option<u64>,
}
