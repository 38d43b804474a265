use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::adapter::{CaptureAdapter, CaptureEvent};
use crate::audio::{
    convert, AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource,
};
use crate::error::CaptureError;
use crate::nats::{
    CaptureAction, CaptureErrorKind, CaptureErrorMessage, NatsClient, TranscriptMessage,
};

/// Capture adapter backed by the loqa STT service
///
/// Each `start()` opens a new capture instance with its own id. Transcript
/// and error messages tagged with another instance id are dropped, so a
/// late flush from a stopped instance never leaks into the next one.
pub struct NatsCapture {
    nats: Arc<NatsClient>,
    source: AudioSource,
    audio_config: AudioBackendConfig,
    next_capture_id: AtomicU64,
    active: Mutex<Option<ActiveCapture>>,
}

struct ActiveCapture {
    capture_id: u64,
    backend: Option<Box<dyn AudioBackend>>,
    stopped: bool,
    frame_task: Option<JoinHandle<()>>,
    event_task: JoinHandle<()>,
}

impl NatsCapture {
    pub fn new(nats: Arc<NatsClient>, source: AudioSource, audio_config: AudioBackendConfig) -> Self {
        Self {
            nats,
            source,
            audio_config,
            next_capture_id: AtomicU64::new(1),
            active: Mutex::new(None),
        }
    }

    /// Stop the backend and tell the STT service to flush
    async fn halt(&self, capture: &mut ActiveCapture) {
        if capture.stopped {
            return;
        }
        capture.stopped = true;

        if let Some(backend) = capture.backend.as_mut() {
            if let Err(e) = backend.stop().await {
                warn!("Failed to stop {} backend: {}", backend.name(), e);
            }
        }

        if let Err(e) = self
            .nats
            .publish_capture_control(capture.capture_id, CaptureAction::Stop, capture.backend.is_none())
            .await
        {
            warn!("Failed to request capture stop: {}", e);
        }
    }

    fn spawn_frame_pump(
        &self,
        capture_id: u64,
        mut audio_rx: mpsc::Receiver<AudioFrame>,
    ) -> JoinHandle<()> {
        let nats = Arc::clone(&self.nats);
        let config = self.audio_config.clone();

        tokio::spawn(async move {
            let mut sequence: u32 = 0;
            let mut format = (config.target_sample_rate, config.target_channels);

            while let Some(frame) = audio_rx.recv().await {
                let (pcm_bytes, sample_rate, channels) = wire_frame(frame, &config);
                format = (sample_rate, channels);

                if let Err(e) = nats
                    .publish_audio_frame(capture_id, &pcm_bytes, sample_rate, channels, sequence, false)
                    .await
                {
                    error!("Failed to publish audio frame: {}", e);
                }

                sequence = sequence.wrapping_add(1);
            }

            // Final frame marker lets the STT service flush the utterance
            let (sample_rate, channels) = format;
            if let Err(e) = nats
                .publish_audio_frame(capture_id, &[], sample_rate, channels, sequence, true)
                .await
            {
                error!("Failed to send final frame: {}", e);
            }
        })
    }
}

/// Convert a backend frame for the bus, labelled with the format it ended up in
///
/// Decimation only divides by whole ratios, so e.g. 44.1 kHz input lands on
/// 22.05 kHz rather than the configured target.
fn wire_frame(frame: AudioFrame, config: &AudioBackendConfig) -> (Vec<u8>, u32, u16) {
    let frame = convert::process_frame(frame, config.target_sample_rate, config.target_channels);
    if frame.sample_rate != config.target_sample_rate {
        debug!(
            "Streaming {} Hz audio, target is {} Hz",
            frame.sample_rate, config.target_sample_rate
        );
    }
    (convert::to_pcm_bytes(&frame.samples), frame.sample_rate, frame.channels)
}

/// Bring the local backend up, then announce the capture to the STT service
///
/// A capture is only announced once its audio is flowing. If the
/// announcement fails the backend is stopped again.
async fn open_backend(
    mut backend: Option<&mut Box<dyn AudioBackend>>,
    announce: impl Future<Output = anyhow::Result<()>>,
) -> Result<Option<mpsc::Receiver<AudioFrame>>, CaptureError> {
    let audio_rx = match backend.as_mut() {
        Some(backend) => Some(
            backend
                .start()
                .await
                .map_err(|e| CaptureError::Failed(format!("{:#}", e)))?,
        ),
        None => None,
    };

    if let Err(e) = announce.await {
        if let Some(backend) = backend {
            if let Err(stop_err) = backend.stop().await {
                warn!("Failed to stop {} backend: {}", backend.name(), stop_err);
            }
        }
        return Err(CaptureError::Failed(format!("{:#}", e)));
    }

    Ok(audio_rx)
}

#[async_trait::async_trait]
impl CaptureAdapter for NatsCapture {
    async fn start(&self) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError> {
        let mut active = self.active.lock().await;

        // At most one instance: retire the previous one entirely
        if let Some(mut previous) = active.take() {
            self.halt(&mut previous).await;
            previous.event_task.abort();
            if let Some(task) = previous.frame_task.take() {
                task.abort();
            }
        }

        let capture_id = self.next_capture_id.fetch_add(1, Ordering::SeqCst);
        let session_id = self.nats.session_id().to_string();

        info!("Starting capture {} for session {}", capture_id, session_id);

        // Subscribe before requesting the start so no transcript is missed
        let transcripts = self
            .nats
            .subscribe_transcripts()
            .await
            .map_err(|e| CaptureError::Failed(format!("{:#}", e)))?;
        let errors = self
            .nats
            .subscribe_capture_errors()
            .await
            .map_err(|e| CaptureError::Failed(format!("{:#}", e)))?;

        let mut backend = AudioBackendFactory::create(&self.source, self.audio_config.clone())
            .map_err(|e| CaptureError::Failed(format!("{:#}", e)))?;

        let announce = self
            .nats
            .publish_capture_control(capture_id, CaptureAction::Start, backend.is_none());
        let audio_rx = open_backend(backend.as_mut(), announce).await?;

        let frame_task = match (audio_rx, backend.as_ref()) {
            (Some(audio_rx), Some(backend)) => {
                info!("Streaming {} audio to STT", backend.name());
                Some(self.spawn_frame_pump(capture_id, audio_rx))
            }
            _ => None,
        };

        let (tx, rx) = mpsc::channel(64);
        let event_task = tokio::spawn(pump_events(session_id, capture_id, transcripts, errors, tx));

        *active = Some(ActiveCapture {
            capture_id,
            backend,
            stopped: false,
            frame_task,
            event_task,
        });

        Ok(rx)
    }

    async fn stop(&self) {
        let mut active = self.active.lock().await;

        // The event pump keeps running so the final flush still arrives
        if let Some(capture) = active.as_mut() {
            self.halt(capture).await;
        }
    }

    fn name(&self) -> &str {
        "loqa STT (NATS)"
    }
}

/// Translate bus messages for one capture instance into capture events
async fn pump_events(
    session_id: String,
    capture_id: u64,
    mut transcripts: async_nats::Subscriber,
    mut errors: async_nats::Subscriber,
    tx: mpsc::Sender<CaptureEvent>,
) {
    let mut heard_speech = false;

    loop {
        let events = tokio::select! {
            Some(msg) = transcripts.next() => {
                match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
                    Ok(transcript) => {
                        if transcript.session_id != session_id
                            || transcript.capture_id.is_some_and(|id| id != capture_id)
                        {
                            continue;
                        }
                        transcript_events(transcript, &mut heard_speech)
                    }
                    Err(e) => {
                        warn!("Failed to parse transcript message: {}", e);
                        continue;
                    }
                }
            }
            Some(msg) = errors.next() => {
                match serde_json::from_slice::<CaptureErrorMessage>(&msg.payload) {
                    Ok(failure) => {
                        if failure.capture_id.is_some_and(|id| id != capture_id) {
                            continue;
                        }
                        vec![error_event(failure)]
                    }
                    Err(e) => {
                        warn!("Failed to parse capture error message: {}", e);
                        continue;
                    }
                }
            }
            else => break,
        };

        for event in events {
            let terminal = event.is_terminal();
            if tx.send(event).await.is_err() {
                debug!("Capture {} receiver dropped", capture_id);
                return;
            }
            if terminal {
                debug!("Capture {} finished", capture_id);
                return;
            }
        }
    }
}

fn transcript_events(transcript: TranscriptMessage, heard_speech: &mut bool) -> Vec<CaptureEvent> {
    let mut events = Vec::with_capacity(2);
    let text = transcript.text.trim();

    if transcript.partial {
        events.push(CaptureEvent::Interim(text.to_string()));
    } else if !text.is_empty() {
        *heard_speech = true;
        events.push(CaptureEvent::Final(text.to_string()));
    }

    if transcript.end_of_speech {
        events.push(if *heard_speech {
            CaptureEvent::EndOfSpeech
        } else {
            CaptureEvent::NoSpeech
        });
    }

    events
}

fn error_event(failure: CaptureErrorMessage) -> CaptureEvent {
    match failure.kind {
        CaptureErrorKind::PermissionDenied => CaptureEvent::Error(CaptureError::PermissionDenied),
        CaptureErrorKind::Unsupported => {
            CaptureEvent::Error(CaptureError::Unsupported(failure.message))
        }
        CaptureErrorKind::NoSpeech => CaptureEvent::NoSpeech,
        CaptureErrorKind::Failed => CaptureEvent::Error(CaptureError::Failed(failure.message)),
    }
}
