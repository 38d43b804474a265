pub mod client;
pub mod messages;

pub use client::NatsClient;
pub use messages::{
    AudioFrameMessage, CaptureAction, CaptureControlMessage, CaptureErrorKind,
    CaptureErrorMessage, SpeakRequest, SpeechCancelMessage, SpeechEventKind, SpeechEventMessage,
    TranscriptMessage,
};
