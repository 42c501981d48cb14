use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Commands delivered to the daemon over the control socket.
///
/// Each command maps onto exactly one operation of the capture/dispatch
/// core; the daemon performs no scheduling beyond running them as they
/// arrive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Command {
    /// Aggregate all captured text and send it to the inference backend.
    Dispatch,
    /// Screenshot the secondary display and OCR it.
    CaptureScreen,
    /// Screenshot an explicit screen region and OCR it.
    CaptureRegion {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    /// Start or stop the microphone transcription session.
    ToggleMic,
    /// Store a piece of manually entered text.
    Add(String),
    /// Drop all accumulated transcripts.
    Clear,
    /// Change the target programming language used in the prompt template.
    SetLanguage(String),
    Status,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Response {
    Ok,
    Message(String),
    Error(String),
    Status(StatusInfo),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusInfo {
    pub is_recording: bool,
    pub ocr_entries: usize,
    pub mic_entries: usize,
    pub text_entries: usize,
    pub language: String,
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection refused: is promptdeckd running?")]
    ConnectionRefused,

    #[error("Connection timeout")]
    Timeout,
}
