use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use promptdeckd::backend::{await_ready, BackendSupervisor};
use promptdeckd::capture::{CaptureCoordinator, SystemGrabber, TesseractOcr};
use promptdeckd::config;
use promptdeckd::dispatch::{PromptDispatcher, SystemClipboard};
use promptdeckd::mic::{CpalSource, MicSessionController, RecognizerFactory, WhisperRecognizer};
use promptdeckd::resources::Provisioner;
use promptdeckd::server::{Daemon, DaemonServer};
use promptdeckd::transcript::TranscriptStore;

fn socket_path() -> std::path::PathBuf {
    dirs::runtime_dir()
        .map(|p| p.join("promptdeckd.sock"))
        .unwrap_or_else(|| "/tmp/promptdeckd.sock".into())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    info!("promptdeck daemon (promptdeckd) starting...");

    let config = config::load_config()?;

    // Models and server binaries must all be on disk before anything runs.
    let provisioner = Provisioner::new()?;
    provisioner.ensure(&config.required_assets()?).await?;

    let mut supervisor = BackendSupervisor::spawn(
        &config.server_exe_path()?,
        &config.model_path()?,
        &config.backend,
    )?;

    let probe_client = reqwest::Client::new();
    let ready = await_ready(
        &probe_client,
        &config.completion_url(),
        Duration::from_millis(config.backend.probe_interval_ms),
        config.backend.max_probe_attempts,
    )
    .await;
    if let Err(e) = ready {
        supervisor.shutdown();
        return Err(e.into());
    }

    let store = Arc::new(TranscriptStore::new());

    let capture = Arc::new(CaptureCoordinator::new(
        Box::new(SystemGrabber),
        Box::new(TesseractOcr),
        Arc::clone(&store),
        config.screenshots_dir()?,
        config.capture.clone(),
    ));

    let speech_model_path = config.speech_model_path()?;
    let factory: RecognizerFactory = Box::new(move || {
        let recognizer = WhisperRecognizer::load(&speech_model_path)?;
        Ok(Box::new(recognizer) as _)
    });
    let mic = Arc::new(MicSessionController::new(
        Arc::new(CpalSource),
        factory,
        Arc::clone(&store),
        config.mic.clone(),
    ));

    let dispatcher = Arc::new(PromptDispatcher::new(
        config.completion_url(),
        Arc::clone(&store),
        Box::new(SystemClipboard),
        &config.backend,
        &config.prompt,
    )?);

    let daemon = Arc::new(Daemon {
        store,
        mic,
        capture,
        dispatcher,
    });

    let server = DaemonServer::new(socket_path(), daemon);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                warn!("Server stopped with error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    supervisor.shutdown();
    info!("promptdeckd stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
