use shared::ipc::{Command, Response, StatusInfo};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tracing::{debug, error, info};

use crate::capture::{CaptureCoordinator, Region};
use crate::dispatch::{DispatchOutcome, PromptDispatcher};
use crate::mic::{MicSessionController, SessionOutcome, ToggleOutcome};
use crate::transcript::{Category, TranscriptStore};

/// Everything a command can touch. Handlers map failures to error
/// responses; nothing a client sends can take the daemon down.
pub struct Daemon {
    pub store: Arc<TranscriptStore>,
    pub mic: Arc<MicSessionController>,
    pub capture: Arc<CaptureCoordinator>,
    pub dispatcher: Arc<PromptDispatcher>,
}

pub struct DaemonServer {
    socket_path: PathBuf,
    daemon: Arc<Daemon>,
}

impl DaemonServer {
    pub fn new(socket_path: PathBuf, daemon: Arc<Daemon>) -> Self {
        Self { socket_path, daemon }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let socket_path = self.socket_path.clone();

        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }

        info!("Starting socket server at {}", socket_path.display());

        let listener = UnixListener::bind(&socket_path)?;
        debug!("Listener bound successfully");

        loop {
            let daemon = Arc::clone(&self.daemon);
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(daemon, stream).await {
                            error!("Error handling connection: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(
        daemon: Arc<Daemon>,
        mut stream: tokio::net::UnixStream,
    ) -> anyhow::Result<()> {
        let mut buffer = vec![0u8; 4096];
        let n = stream.read(&mut buffer).await?;

        if n == 0 {
            return Ok(());
        }

        buffer.truncate(n);

        let command: Command = serde_json::from_slice(&buffer)?;
        info!("Received command: {:?}", command);

        let response = dispatch_command(&daemon, command).await;

        let response_json = serde_json::to_vec(&response)?;
        stream.write_all(&response_json).await?;

        info!("Sent response: {:?}", response);
        Ok(())
    }
}

pub async fn dispatch_command(daemon: &Arc<Daemon>, command: Command) -> Response {
    match command {
        Command::Dispatch => match daemon.dispatcher.dispatch().await {
            Ok(DispatchOutcome::Dispatched(content)) => {
                Response::Message(format!("Copied {} chars to clipboard", content.len()))
            }
            Ok(DispatchOutcome::Empty) => {
                Response::Message("Nothing to send".to_string())
            }
            Ok(DispatchOutcome::NoContent) => {
                Response::Error("Backend returned no usable result".to_string())
            }
            Err(e) => Response::Error(format!("Dispatch failed: {e}")),
        },
        Command::CaptureScreen => {
            let capture = Arc::clone(&daemon.capture);
            run_blocking(move || capture.capture_display()).await
        }
        Command::CaptureRegion { x, y, width, height } => {
            let capture = Arc::clone(&daemon.capture);
            let region = Region { x, y, width, height };
            run_blocking(move || capture.capture_region(region)).await
        }
        Command::ToggleMic => {
            let mic = Arc::clone(&daemon.mic);
            let result = tokio::task::spawn_blocking(move || mic.toggle()).await;
            match result {
                Ok(ToggleOutcome::Started) => Response::Message("Recording".to_string()),
                Ok(ToggleOutcome::Stopped(outcome)) => match outcome {
                    SessionOutcome::Transcribed { segments } => {
                        Response::Message(format!("Transcribed {segments} segment(s)"))
                    }
                    SessionOutcome::TooShort => {
                        Response::Message("Recording too short, discarded".to_string())
                    }
                    SessionOutcome::Failed(msg) => {
                        Response::Error(format!("Mic session failed: {msg}"))
                    }
                },
                Err(e) => Response::Error(format!("Mic worker panicked: {e}")),
            }
        }
        Command::Add(text) => {
            if daemon.store.append(Category::UserText, &text) {
                Response::Ok
            } else {
                Response::Error("Text was empty".to_string())
            }
        }
        Command::Clear => {
            daemon.store.clear_all();
            info!("Transcripts cleared");
            Response::Ok
        }
        Command::SetLanguage(language) => {
            daemon.dispatcher.set_language(&language);
            info!("Prompt language set to {}", language);
            Response::Ok
        }
        Command::Status => {
            let (ocr_entries, mic_entries, text_entries) = daemon.store.counts();
            Response::Status(StatusInfo {
                is_recording: daemon.mic.is_recording(),
                ocr_entries,
                mic_entries,
                text_entries,
                language: daemon.dispatcher.language(),
            })
        }
    }
}

async fn run_blocking<F>(op: F) -> Response
where
    F: FnOnce() -> Result<PathBuf, crate::capture::CaptureError> + Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(Ok(path)) => Response::Message(format!("Saved {}", path.display())),
        Ok(Err(e)) => Response::Error(format!("Capture failed: {e}")),
        Err(e) => Response::Error(format!("Capture worker panicked: {e}")),
    }
}

impl Drop for DaemonServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}
