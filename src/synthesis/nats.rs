use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream::StreamExt;
use serde::Deserialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::adapter::SynthesisAdapter;
use crate::error::SynthesisError;
use crate::nats::{NatsClient, SpeakRequest, SpeechEventKind, SpeechEventMessage};

/// Voice parameters forwarded with every speak request
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceSettings {
    #[serde(default)]
    pub voice: Option<String>,

    /// Playback rate, 1.0 = normal
    #[serde(default = "default_rate")]
    pub rate: f32,
}

fn default_rate() -> f32 {
    0.95
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice: None,
            rate: default_rate(),
        }
    }
}

/// Synthesis adapter backed by the loqa TTS service
pub struct NatsSynthesis {
    nats: Arc<NatsClient>,
    settings: VoiceSettings,
    next_utterance_id: AtomicU64,
    /// Utterance currently playing and its cancel signal
    current: Mutex<Option<(u64, Arc<Notify>)>>,
}

impl NatsSynthesis {
    pub fn new(nats: Arc<NatsClient>, settings: VoiceSettings) -> Self {
        Self {
            nats,
            settings,
            next_utterance_id: AtomicU64::new(1),
            current: Mutex::new(None),
        }
    }

    fn request(&self, utterance_id: u64, text: &str, priming: bool) -> SpeakRequest {
        SpeakRequest {
            session_id: self.nats.session_id().to_string(),
            utterance_id,
            text: text.to_string(),
            voice: self.settings.voice.clone(),
            rate: self.settings.rate,
            priming,
        }
    }

    fn set_current(&self, entry: Option<(u64, Arc<Notify>)>) -> Option<(u64, Arc<Notify>)> {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::replace(&mut *current, entry)
    }

    async fn play(&self, utterance_id: u64, text: &str, cancelled: &Notify) -> Result<(), SynthesisError> {
        let mut events = self
            .nats
            .subscribe_speech_events()
            .await
            .map_err(|e| SynthesisError::Unavailable(format!("{:#}", e)))?;

        self.nats
            .publish_speak(&self.request(utterance_id, text, false))
            .await
            .map_err(|e| SynthesisError::Unavailable(format!("{:#}", e)))?;

        loop {
            tokio::select! {
                _ = cancelled.notified() => {
                    debug!("Utterance {} cancelled", utterance_id);
                    return Ok(());
                }
                msg = events.next() => {
                    let Some(msg) = msg else {
                        return Err(SynthesisError::Failed("speech event stream closed".to_string()));
                    };

                    let event = match serde_json::from_slice::<SpeechEventMessage>(&msg.payload) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("Failed to parse speech event: {}", e);
                            continue;
                        }
                    };

                    if event.utterance_id != utterance_id {
                        continue;
                    }

                    match event.event {
                        SpeechEventKind::Started => debug!("Utterance {} started", utterance_id),
                        SpeechEventKind::Completed => return Ok(()),
                        SpeechEventKind::Failed => {
                            return Err(SynthesisError::Failed(
                                event.detail.unwrap_or_else(|| "playback failed".to_string()),
                            ));
                        }
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl SynthesisAdapter for NatsSynthesis {
    async fn speak(&self, text: &str) -> Result<(), SynthesisError> {
        let utterance_id = self.next_utterance_id.fetch_add(1, Ordering::SeqCst);
        let cancelled = Arc::new(Notify::new());

        // One utterance at a time
        if let Some((previous, signal)) = self.set_current(Some((utterance_id, Arc::clone(&cancelled)))) {
            signal.notify_one();
            if let Err(e) = self.nats.publish_speech_cancel(Some(previous)).await {
                warn!("Failed to cancel utterance {}: {}", previous, e);
            }
        }

        info!("Speaking utterance {} ({} chars)", utterance_id, text.len());

        let result = self.play(utterance_id, text, &cancelled).await;

        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if current.as_ref().is_some_and(|(id, _)| *id == utterance_id) {
            *current = None;
        }
        drop(current);

        result
    }

    async fn cancel(&self) {
        let Some((utterance_id, signal)) = self.set_current(None) else {
            return;
        };

        signal.notify_one();

        if let Err(e) = self.nats.publish_speech_cancel(Some(utterance_id)).await {
            warn!("Failed to cancel utterance {}: {}", utterance_id, e);
        }
    }

    async fn unlock(&self) -> Result<(), SynthesisError> {
        let utterance_id = self.next_utterance_id.fetch_add(1, Ordering::SeqCst);

        self.nats
            .publish_speak(&self.request(utterance_id, "", true))
            .await
            .map_err(|e| SynthesisError::Unavailable(format!("{:#}", e)))
    }

    fn name(&self) -> &str {
        "loqa TTS (NATS)"
    }
}
