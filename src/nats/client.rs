use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use tracing::{debug, info};

use super::messages::{
    AudioFrameMessage, CaptureAction, CaptureControlMessage, SpeakRequest, SpeechCancelMessage,
};

/// Session-scoped handle on the loqa NATS bus
///
/// Subjects:
/// - `audio.frame.tutor-<session>`: PCM frames for the STT service
/// - `stt.control.<session>`: capture start/stop
/// - `stt.text.>`: partial and final transcripts (filtered by session id)
/// - `stt.error.<session>`: capture failures
/// - `tts.speak.<session>` / `tts.cancel.<session>`: playback requests
/// - `tts.event.<session>`: playback lifecycle
pub struct NatsClient {
    client: Client,
    session_id: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, session_id: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client, session_id })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Publish audio frame to NATS
    pub async fn publish_audio_frame(
        &self,
        capture_id: u64,
        pcm_bytes: &[u8],
        sample_rate: u32,
        channels: u16,
        sequence: u32,
        is_final: bool,
    ) -> Result<()> {
        let subject = format!("audio.frame.tutor-{}", self.session_id);

        let message = AudioFrameMessage {
            session_id: self.session_id.clone(),
            capture_id,
            sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            sample_rate,
            channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: is_final,
        };

        self.publish_json(subject, &message)
            .await
            .context("Failed to publish audio frame")?;

        debug!(
            "Published audio frame (capture={}, seq={}, bytes={}, final={})",
            capture_id,
            sequence,
            pcm_bytes.len(),
            is_final
        );

        Ok(())
    }

    /// Ask the STT service to start or stop a capture instance
    pub async fn publish_capture_control(
        &self,
        capture_id: u64,
        action: CaptureAction,
        remote_audio: bool,
    ) -> Result<()> {
        let subject = format!("stt.control.{}", self.session_id);

        let message = CaptureControlMessage {
            session_id: self.session_id.clone(),
            capture_id,
            action,
            remote_audio,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        self.publish_json(subject, &message)
            .await
            .context("Failed to publish capture control")?;

        info!("Capture {} -> {:?}", capture_id, action);

        Ok(())
    }

    /// Subscribe to transcript messages
    pub async fn subscribe_transcripts(&self) -> Result<async_nats::Subscriber> {
        // loqa-core publishes to stt.text.partial and stt.text.final;
        // messages are filtered by session_id in the payload
        self.subscribe("stt.text.>".to_string()).await
    }

    /// Subscribe to capture errors for this session
    pub async fn subscribe_capture_errors(&self) -> Result<async_nats::Subscriber> {
        self.subscribe(format!("stt.error.{}", self.session_id)).await
    }

    /// Publish a speech request
    pub async fn publish_speak(&self, request: &SpeakRequest) -> Result<()> {
        let subject = format!("tts.speak.{}", self.session_id);

        self.publish_json(subject, request)
            .await
            .context("Failed to publish speak request")
    }

    /// Cancel one utterance, or all of them
    pub async fn publish_speech_cancel(&self, utterance_id: Option<u64>) -> Result<()> {
        let subject = format!("tts.cancel.{}", self.session_id);

        let message = SpeechCancelMessage {
            session_id: self.session_id.clone(),
            utterance_id,
        };

        self.publish_json(subject, &message)
            .await
            .context("Failed to publish speech cancel")
    }

    /// Subscribe to playback events for this session
    pub async fn subscribe_speech_events(&self) -> Result<async_nats::Subscriber> {
        self.subscribe(format!("tts.event.{}", self.session_id)).await
    }

    /// Flush pending publishes before shutdown
    pub async fn close(&self) -> Result<()> {
        info!("Closing NATS connection");
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;
        Ok(())
    }

    async fn publish_json<T: serde::Serialize>(&self, subject: String, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.client.publish(subject, payload.into()).await?;
        Ok(())
    }

    async fn subscribe(&self, subject: String) -> Result<async_nats::Subscriber> {
        info!("Subscribing to {}", subject);

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {}", subject))?;

        Ok(subscriber)
    }
}
