use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::{AudioBackendConfig, AudioSource};
use crate::session::{EndpointPolicy, SessionConfig};
use crate::synthesis::VoiceSettings;
use crate::tutor::{TutorSettings, DEFAULT_SYSTEM_PROMPT};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub nats: NatsConfig,
    pub audio: AudioConfig,
    pub tutor: TutorConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub wake_lock: WakeLockConfig,
    #[serde(default)]
    pub voice: VoiceSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct NatsConfig {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// `remote` for the loqa audio node, otherwise a WAV file path
    pub source: String,
    pub sample_rate: u32,
    pub channels: u16,
    #[serde(default = "default_buffer_ms")]
    pub buffer_ms: u64,
}

fn default_buffer_ms() -> u64 {
    100
}

impl AudioConfig {
    pub fn source(&self) -> AudioSource {
        match self.source.trim() {
            "" | "remote" => AudioSource::Remote,
            path => AudioSource::File(PathBuf::from(path)),
        }
    }

    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.sample_rate,
            target_channels: self.channels,
            buffer_duration_ms: self.buffer_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TutorConfig {
    /// Base URL of an OpenAI-compatible API
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_history() -> usize {
    10
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    400
}

impl TutorConfig {
    /// Resolve client settings, reading the API key from the environment.
    /// A missing key is allowed for local endpoints.
    pub fn settings(&self) -> TutorSettings {
        let api_key = std::env::var(&self.api_key_env).unwrap_or_default();

        TutorSettings {
            base_url: self.endpoint.clone(),
            model: self.model.clone(),
            api_key,
            system_prompt: self
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_history: self.max_history,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// 0 waits for the tutor indefinitely
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Finalize on silence instead of the engine's end-of-speech signal
    #[serde(default)]
    pub silence_debounce_ms: Option<u64>,
}

fn default_settle_delay_ms() -> u64 {
    600
}

fn default_reply_timeout_secs() -> u64 {
    30
}

fn default_history_window() -> usize {
    10
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            reply_timeout_secs: default_reply_timeout_secs(),
            history_window: default_history_window(),
            silence_debounce_ms: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WakeLockConfig {
    #[serde(default = "default_wake_lock_enabled")]
    pub enabled: bool,
    #[serde(default = "default_wake_lock_reason")]
    pub reason: String,
}

fn default_wake_lock_enabled() -> bool {
    true
}

fn default_wake_lock_reason() -> String {
    "Tutoring session in progress".to_string()
}

impl Default for WakeLockConfig {
    fn default() -> Self {
        Self {
            enabled: default_wake_lock_enabled(),
            reason: default_wake_lock_reason(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Invalid config {}", path))
    }

    /// Controller settings with a fresh session id
    pub fn session_config(&self) -> SessionConfig {
        let session = &self.session;

        let endpoint = match session.silence_debounce_ms {
            Some(ms) if ms > 0 => EndpointPolicy::SilenceDebounce(Duration::from_millis(ms)),
            _ => EndpointPolicy::AdapterSignal,
        };

        let reply_timeout = match session.reply_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        SessionConfig {
            settle_delay: Duration::from_millis(session.settle_delay_ms),
            reply_timeout,
            history_window: session.history_window,
            endpoint,
            ..SessionConfig::default()
        }
    }
}
