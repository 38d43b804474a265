use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use loqa_tutor::{
    create_router, AppState, AudioSource, Collaborators, Config, HttpTutorClient, KeepAwakeLock,
    NatsCapture, NatsClient, NatsSynthesis, NoopWakeLock, SessionController, WakeLock,
};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "loqa-tutor", version, about = "Voice English tutor session service")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/loqa-tutor")]
    config: String,

    /// Stream this WAV file instead of the configured audio source
    #[arg(long)]
    audio_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Loqa Tutor v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let session_config = cfg.session_config();
    let source = match args.audio_file {
        Some(path) => AudioSource::File(path),
        None => cfg.audio.source(),
    };
    info!("Audio source: {:?}", source);

    let nats = Arc::new(NatsClient::connect(&cfg.nats.url, session_config.session_id.clone()).await?);

    let tutor_settings = cfg.tutor.settings();
    if tutor_settings.api_key.is_empty() {
        warn!(
            "{} is not set; tutor requests are sent without authorization",
            cfg.tutor.api_key_env
        );
    }

    let wake_lock: Arc<dyn WakeLock> = if cfg.wake_lock.enabled {
        Arc::new(KeepAwakeLock::new(cfg.wake_lock.reason.clone()))
    } else {
        Arc::new(NoopWakeLock)
    };

    let controller = SessionController::spawn(
        session_config,
        Collaborators {
            capture: Arc::new(NatsCapture::new(
                Arc::clone(&nats),
                source,
                cfg.audio.backend_config(),
            )),
            synthesis: Arc::new(NatsSynthesis::new(Arc::clone(&nats), cfg.voice.clone())),
            tutor: Arc::new(HttpTutorClient::new(tutor_settings)),
            wake_lock,
        },
    );

    let app = create_router(AppState::new(controller.clone()));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    controller.shutdown().await;
    nats.close().await?;

    info!("Loqa Tutor stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
