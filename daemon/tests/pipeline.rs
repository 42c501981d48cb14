use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use shared::ipc::{Command, Response};

use promptdeckd::capture::{CaptureCoordinator, CaptureError, Ocr, Region, ScreenGrabber};
use promptdeckd::config::{BackendConfig, CaptureConfig, MicConfig, PromptConfig};
use promptdeckd::dispatch::{DispatchError, PromptDispatcher, TextSink};
use promptdeckd::mic::{AudioSource, MicSessionController, RecognizerFactory, SpeechRecognizer};
use promptdeckd::server::{dispatch_command, Daemon};
use promptdeckd::transcript::TranscriptStore;

struct StubGrabber;

impl ScreenGrabber for StubGrabber {
    fn grab_secondary_display(&self) -> Result<image::RgbaImage, CaptureError> {
        Ok(image::RgbaImage::from_pixel(8, 8, image::Rgba([30, 30, 30, 255])))
    }

    fn grab_region(&self, _region: Region) -> Result<image::RgbaImage, CaptureError> {
        self.grab_secondary_display()
    }
}

struct StubOcr;

impl Ocr for StubOcr {
    fn recognize(&self, _image: &Path, _language: &str) -> anyhow::Result<String> {
        Ok("def f(x): return x".to_string())
    }
}

/// Produces a recording well under the 32000-byte floor.
struct ShortMic;

impl AudioSource for ShortMic {
    fn capture(
        &self,
        _sample_rate: u32,
        frames: mpsc::Sender<Vec<i16>>,
        stop: mpsc::Receiver<()>,
    ) -> anyhow::Result<()> {
        let _ = frames.send(vec![0i16; 64]);
        let _ = stop.recv();
        Ok(())
    }
}

struct StubClipboard {
    contents: Arc<Mutex<Option<String>>>,
}

impl TextSink for StubClipboard {
    fn deliver(&self, text: &str) -> Result<(), DispatchError> {
        *self.contents.lock().unwrap() = Some(text.to_string());
        Ok(())
    }
}

/// One-shot completion endpoint answering with a fixed body.
fn spawn_backend(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 16384];
        let _ = stream.read(&mut buf);
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes());
    });
    format!("http://{addr}/completion")
}

#[tokio::test]
async fn capture_mic_and_text_flow_into_one_dispatch() {
    let screenshots = tempfile::tempdir().unwrap();
    let store = Arc::new(TranscriptStore::new());

    let capture = Arc::new(CaptureCoordinator::new(
        Box::new(StubGrabber),
        Box::new(StubOcr),
        Arc::clone(&store),
        screenshots.path().to_path_buf(),
        CaptureConfig::default(),
    ));

    let factory: RecognizerFactory = Box::new(|| {
        // The only mic session is too short, so recognition never runs.
        struct Never;
        impl SpeechRecognizer for Never {
            fn transcribe(&mut self, _samples: &[f32], _language: &str) -> anyhow::Result<Vec<String>> {
                panic!("recognizer must not run for a discarded session");
            }
        }
        Ok(Box::new(Never) as Box<dyn SpeechRecognizer>)
    });
    let mic = Arc::new(MicSessionController::new(
        Arc::new(ShortMic),
        factory,
        Arc::clone(&store),
        MicConfig::default(),
    ));

    let clipboard_contents = Arc::new(Mutex::new(None));
    let backend_url = spawn_backend(r#"{"content":"Looks correct."}"#);
    let dispatcher = Arc::new(
        PromptDispatcher::new(
            backend_url,
            Arc::clone(&store),
            Box::new(StubClipboard {
                contents: Arc::clone(&clipboard_contents),
            }),
            &BackendConfig::default(),
            &PromptConfig::default(),
        )
        .unwrap(),
    );

    let daemon = Arc::new(Daemon {
        store: Arc::clone(&store),
        mic,
        capture,
        dispatcher,
    });

    // Screenshot lands its OCR text.
    let response = dispatch_command(&daemon, Command::CaptureScreen).await;
    assert!(matches!(response, Response::Message(_)));

    // A too-short mic session contributes nothing.
    dispatch_command(&daemon, Command::ToggleMic).await;
    let response = dispatch_command(&daemon, Command::ToggleMic).await;
    assert_eq!(
        response,
        Response::Message("Recording too short, discarded".to_string())
    );

    // Manual text joins the aggregate.
    let response = dispatch_command(&daemon, Command::Add("please review".to_string())).await;
    assert_eq!(response, Response::Ok);

    assert_eq!(store.aggregate(), "def f(x): return x\nplease review");

    let status = dispatch_command(&daemon, Command::Status).await;
    match status {
        Response::Status(info) => {
            assert!(!info.is_recording);
            assert_eq!(info.ocr_entries, 1);
            assert_eq!(info.mic_entries, 0);
            assert_eq!(info.text_entries, 1);
            assert_eq!(info.language, "C#");
        }
        other => panic!("unexpected status response: {other:?}"),
    }

    // Dispatch routes the answer to the clipboard.
    let response = dispatch_command(&daemon, Command::Dispatch).await;
    assert_eq!(
        response,
        Response::Message("Copied 14 chars to clipboard".to_string())
    );
    assert_eq!(
        clipboard_contents.lock().unwrap().as_deref(),
        Some("Looks correct.")
    );

    // Transcripts survive dispatch until an explicit clear.
    assert!(!store.is_empty());
    let response = dispatch_command(&daemon, Command::Clear).await;
    assert_eq!(response, Response::Ok);
    assert!(store.is_empty());

    // A second dispatch with nothing collected makes no request.
    let response = dispatch_command(&daemon, Command::Dispatch).await;
    assert_eq!(response, Response::Message("Nothing to send".to_string()));
}
