use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use hound::WavReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::convert;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            bail!(
                "Unsupported WAV format: {:?} {}-bit (expected 16-bit PCM)",
                spec.sample_format,
                spec.bits_per_sample
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split into `buffer_duration_ms` frames converted to the target format
    pub fn frames(&self, config: &AudioBackendConfig) -> Vec<AudioFrame> {
        let channels = self.channels.max(1) as usize;
        let samples_per_frame =
            (self.sample_rate as u64 * config.buffer_duration_ms / 1000).max(1) as usize * channels;

        self.samples
            .chunks(samples_per_frame)
            .enumerate()
            .map(|(i, chunk)| {
                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: self.sample_rate,
                    channels: self.channels,
                    timestamp_ms: i as u64 * config.buffer_duration_ms,
                };
                convert::process_frame(frame, config.target_sample_rate, config.target_channels)
            })
            .collect()
    }
}

/// Streams a WAV file as if it were live microphone input
pub struct FileBackend {
    config: AudioBackendConfig,
    file: Arc<AudioFile>,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn open(path: impl AsRef<Path>, config: AudioBackendConfig) -> Result<Self> {
        let file = AudioFile::open(path)?;

        Ok(Self {
            config,
            file: Arc::new(file),
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            bail!("Already capturing");
        }

        info!("Streaming audio from {}", self.file.path);

        let (tx, rx) = mpsc::channel(100);
        let frames = self.file.frames(&self.config);
        let pace = Duration::from_millis(self.config.buffer_duration_ms.max(1));
        let capturing = Arc::clone(&self.capturing);

        capturing.store(true, Ordering::SeqCst);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pace);

            for frame in frames {
                ticker.tick().await;
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }
                if tx.send(frame).await.is_err() {
                    break;
                }
            }

            capturing.store(false, Ordering::SeqCst);
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);

        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!("File streaming task panicked: {}", e);
                }
            }
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}
