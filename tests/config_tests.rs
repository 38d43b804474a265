use anyhow::Result;
use loqa_tutor::audio::AudioSource;
use loqa_tutor::session::EndpointPolicy;
use loqa_tutor::Config;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MINIMAL: &str = r#"
[service]
name = "loqa-tutor"

[service.http]
bind = "127.0.0.1"
port = 3100

[nats]
url = "nats://localhost:4222"

[audio]
source = "remote"
sample_rate = 16000
channels = 1

[tutor]
endpoint = "http://localhost:11434"
model = "llama3"
api_key_env = "LOQA_TUTOR_TEST_UNSET_KEY"
"#;

fn write_config(dir: &Path, contents: &str) -> Result<String> {
    let path = dir.join("loqa-tutor.toml");
    std::fs::write(&path, contents)?;
    Ok(path.display().to_string())
}

#[test]
fn test_minimal_config_uses_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cfg = Config::load(&write_config(dir.path(), MINIMAL)?)?;

    assert_eq!(cfg.service.http.port, 3100);
    assert_eq!(cfg.audio.source(), AudioSource::Remote);
    assert!(cfg.wake_lock.enabled);
    assert!((cfg.voice.rate - 0.95).abs() < f32::EPSILON);

    let session = cfg.session_config();
    assert_eq!(session.settle_delay, Duration::from_millis(600));
    assert_eq!(session.reply_timeout, Some(Duration::from_secs(30)));
    assert_eq!(session.history_window, 10);
    assert_eq!(session.endpoint, EndpointPolicy::AdapterSignal);
    assert!(session.session_id.starts_with("tutor-"));

    let tutor = cfg.tutor.settings();
    assert_eq!(tutor.base_url, "http://localhost:11434");
    assert!(tutor.api_key.is_empty());
    assert!(tutor.system_prompt.contains("English tutor"));

    Ok(())
}

#[test]
fn test_session_section_overrides() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let contents = format!(
        "{}\n{}",
        MINIMAL,
        r#"
[session]
settle_delay_ms = 250
reply_timeout_secs = 0
history_window = 4
silence_debounce_ms = 1500

[wake_lock]
enabled = false
"#
    );
    let cfg = Config::load(&write_config(dir.path(), &contents)?)?;

    let session = cfg.session_config();
    assert_eq!(session.settle_delay, Duration::from_millis(250));
    assert_eq!(session.reply_timeout, None);
    assert_eq!(session.history_window, 4);
    assert_eq!(
        session.endpoint,
        EndpointPolicy::SilenceDebounce(Duration::from_millis(1500))
    );
    assert!(!cfg.wake_lock.enabled);

    Ok(())
}

#[test]
fn test_file_audio_source() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let contents = MINIMAL.replace("source = \"remote\"", "source = \"fixtures/lesson.wav\"");
    let cfg = Config::load(&write_config(dir.path(), &contents)?)?;

    assert_eq!(
        cfg.audio.source(),
        AudioSource::File(PathBuf::from("fixtures/lesson.wav"))
    );
    assert_eq!(cfg.audio.backend_config().buffer_duration_ms, 100);

    Ok(())
}

#[test]
fn test_missing_config_fails() {
    assert!(Config::load("/nonexistent/loqa-tutor").is_err());
}

#[test]
fn test_bundled_config_loads() -> Result<()> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/loqa-tutor.toml");
    let cfg = Config::load(&path.display().to_string())?;

    assert_eq!(cfg.service.name, "loqa-tutor");
    assert_eq!(cfg.audio.source(), AudioSource::Remote);

    Ok(())
}
