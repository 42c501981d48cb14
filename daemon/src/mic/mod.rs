pub mod recognizer;
pub mod source;

use anyhow::Result;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{info, warn};

use crate::config::MicConfig;
use crate::transcript::{Category, TranscriptStore};

pub use recognizer::{SpeechRecognizer, WhisperRecognizer};
pub use source::{AudioSource, CpalSource};

/// Produces the speech recognizer on first use. Model loading is slow,
/// so it is deferred until a session actually needs it.
pub type RecognizerFactory = Box<dyn Fn() -> Result<Box<dyn SpeechRecognizer>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Draining,
}

/// What a finished session produced. Every variant returns the
/// controller to Idle; failures are reported, never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Transcribed { segments: usize },
    TooShort,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started,
    Stopped(SessionOutcome),
}

struct ActiveSession {
    stop_tx: mpsc::Sender<()>,
    done_rx: mpsc::Receiver<SessionOutcome>,
    handle: JoinHandle<()>,
}

struct Inner {
    state: SessionState,
    session: Option<ActiveSession>,
}

/// Drives one microphone session at a time through
/// Idle -> Recording -> Draining -> Idle. A single mutex covers the whole
/// toggle, so concurrent commands serialize instead of racing the worker.
pub struct MicSessionController {
    inner: Mutex<Inner>,
    source: Arc<dyn AudioSource>,
    factory: Arc<RecognizerFactory>,
    recognizer: Arc<Mutex<Option<Box<dyn SpeechRecognizer>>>>,
    store: Arc<TranscriptStore>,
    config: MicConfig,
}

impl MicSessionController {
    pub fn new(
        source: Arc<dyn AudioSource>,
        factory: RecognizerFactory,
        store: Arc<TranscriptStore>,
        config: MicConfig,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                session: None,
            }),
            source,
            factory: Arc::new(factory),
            recognizer: Arc::new(Mutex::new(None)),
            store,
            config,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().unwrap().state != SessionState::Idle
    }

    /// Idle starts a session; anything else stops the running one. The
    /// stop path blocks the caller until the worker has drained and
    /// transcribed.
    pub fn toggle(&self) -> ToggleOutcome {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            SessionState::Idle => {
                self.start_locked(&mut inner);
                ToggleOutcome::Started
            }
            SessionState::Recording | SessionState::Draining => {
                ToggleOutcome::Stopped(self.stop_locked(&mut inner))
            }
        }
    }

    /// Begin recording. No-op returning false when a session is already
    /// running.
    pub fn start(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != SessionState::Idle {
            return false;
        }
        self.start_locked(&mut inner);
        true
    }

    /// Stop and drain the running session. No-op returning None when
    /// idle.
    pub fn stop(&self) -> Option<SessionOutcome> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == SessionState::Idle {
            return None;
        }
        Some(self.stop_locked(&mut inner))
    }

    fn start_locked(&self, inner: &mut Inner) {
        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let source = Arc::clone(&self.source);
        let factory = Arc::clone(&self.factory);
        let recognizer = Arc::clone(&self.recognizer);
        let store = Arc::clone(&self.store);
        let config = self.config.clone();

        let handle = std::thread::spawn(move || {
            let outcome = run_session(&*source, &factory, &recognizer, &store, &config, stop_rx);
            let _ = done_tx.send(outcome);
        });

        inner.state = SessionState::Recording;
        inner.session = Some(ActiveSession {
            stop_tx,
            done_rx,
            handle,
        });
        info!("Microphone session started");
    }

    fn stop_locked(&self, inner: &mut Inner) -> SessionOutcome {
        let session = match inner.session.take() {
            Some(s) => s,
            None => {
                inner.state = SessionState::Idle;
                return SessionOutcome::Failed("No active session".to_string());
            }
        };
        inner.state = SessionState::Draining;

        let _ = session.stop_tx.send(());
        let outcome = session
            .done_rx
            .recv()
            .unwrap_or_else(|_| SessionOutcome::Failed("Session worker vanished".to_string()));
        let _ = session.handle.join();

        inner.state = SessionState::Idle;
        info!("Microphone session finished: {:?}", outcome);
        outcome
    }
}

fn run_session(
    source: &dyn AudioSource,
    factory: &RecognizerFactory,
    recognizer: &Arc<Mutex<Option<Box<dyn SpeechRecognizer>>>>,
    store: &TranscriptStore,
    config: &MicConfig,
    stop_rx: mpsc::Receiver<()>,
) -> SessionOutcome {
    let (frames_tx, frames_rx) = mpsc::channel();

    if let Err(e) = source.capture(config.sample_rate, frames_tx, stop_rx) {
        warn!("Audio capture failed: {}", e);
        return SessionOutcome::Failed(e.to_string());
    }

    let mut pcm: Vec<i16> = Vec::new();
    for frame in frames_rx.try_iter() {
        pcm.extend_from_slice(&frame);
    }

    // Each sample is two bytes; anything under the floor is noise or an
    // accidental toggle.
    if pcm.len() * 2 < config.min_audio_bytes {
        info!("Recording too short ({} bytes), discarding", pcm.len() * 2);
        return SessionOutcome::TooShort;
    }

    let samples: Vec<f32> = pcm.iter().map(|&s| s as f32 / 32768.0).collect();

    let mut slot = recognizer.lock().unwrap();
    if slot.is_none() {
        match factory() {
            Ok(r) => *slot = Some(r),
            Err(e) => {
                warn!("Failed to initialize recognizer: {}", e);
                return SessionOutcome::Failed(e.to_string());
            }
        }
    }
    let recognizer = slot.as_mut().unwrap();

    let segments = match recognizer.transcribe(&samples, &config.language) {
        Ok(segments) => segments,
        Err(e) => {
            warn!("Transcription failed: {}", e);
            return SessionOutcome::Failed(e.to_string());
        }
    };

    // One store entry per session: non-blank segments joined one per line.
    let lines: Vec<&str> = segments
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    store.append(Category::Mic, &lines.join("\n"));
    SessionOutcome::Transcribed { segments: lines.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Emits the configured frames immediately, then blocks until stopped.
    struct FakeSource {
        frames: Vec<Vec<i16>>,
        fail: bool,
    }

    impl AudioSource for FakeSource {
        fn capture(
            &self,
            _sample_rate: u32,
            frames: mpsc::Sender<Vec<i16>>,
            stop: mpsc::Receiver<()>,
        ) -> Result<()> {
            if self.fail {
                anyhow::bail!("no input device");
            }
            for frame in &self.frames {
                let _ = frames.send(frame.clone());
            }
            let _ = stop.recv();
            Ok(())
        }
    }

    struct FakeRecognizer {
        segments: Vec<String>,
        seen_samples: Arc<Mutex<Vec<f32>>>,
    }

    impl SpeechRecognizer for FakeRecognizer {
        fn transcribe(&mut self, samples: &[f32], _language: &str) -> Result<Vec<String>> {
            self.seen_samples.lock().unwrap().extend_from_slice(samples);
            Ok(self.segments.clone())
        }
    }

    fn controller_with(
        frames: Vec<Vec<i16>>,
        segments: Vec<String>,
    ) -> (MicSessionController, Arc<TranscriptStore>, Arc<AtomicUsize>, Arc<Mutex<Vec<f32>>>) {
        let store = Arc::new(TranscriptStore::new());
        let factory_calls = Arc::new(AtomicUsize::new(0));
        let seen_samples = Arc::new(Mutex::new(Vec::new()));

        let calls = Arc::clone(&factory_calls);
        let seen = Arc::clone(&seen_samples);
        let factory: RecognizerFactory = Box::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeRecognizer {
                segments: segments.clone(),
                seen_samples: Arc::clone(&seen),
            }) as _)
        });

        let controller = MicSessionController::new(
            Arc::new(FakeSource { frames, fail: false }),
            factory,
            Arc::clone(&store),
            MicConfig::default(),
        );
        (controller, store, factory_calls, seen_samples)
    }

    // 16001 samples is 32002 bytes, just over the default floor.
    fn long_frame() -> Vec<i16> {
        vec![1000i16; 16001]
    }

    #[test]
    fn test_short_session_is_discarded_before_recognition() {
        let (controller, store, factory_calls, _) =
            controller_with(vec![vec![0i16; 100]], vec!["unused".to_string()]);

        assert_eq!(controller.toggle(), ToggleOutcome::Started);
        assert!(controller.is_recording());
        let outcome = controller.toggle();

        assert_eq!(outcome, ToggleOutcome::Stopped(SessionOutcome::TooShort));
        assert!(store.is_empty());
        assert_eq!(factory_calls.load(Ordering::SeqCst), 0);
        assert!(!controller.is_recording());
    }

    #[test]
    fn test_full_session_transcribes_and_stores_segments() {
        let (controller, store, factory_calls, seen_samples) = controller_with(
            vec![long_frame()],
            vec!["hello".to_string(), "  world  ".to_string(), "  ".to_string()],
        );

        controller.toggle();
        let outcome = controller.toggle();

        assert_eq!(
            outcome,
            ToggleOutcome::Stopped(SessionOutcome::Transcribed { segments: 2 })
        );
        // The whole session lands as one mic entry, segments one per line.
        assert_eq!(store.counts(), (0, 1, 0));
        assert_eq!(store.aggregate(), "hello\nworld");
        assert_eq!(factory_calls.load(Ordering::SeqCst), 1);

        // Samples are normalized i16 values.
        let seen = seen_samples.lock().unwrap();
        assert_eq!(seen.len(), 16001);
        assert!((seen[0] - 1000.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn test_all_blank_segments_store_nothing() {
        let (controller, store, _, _) = controller_with(
            vec![long_frame()],
            vec!["  ".to_string(), String::new()],
        );

        controller.toggle();
        let outcome = controller.toggle();

        assert_eq!(
            outcome,
            ToggleOutcome::Stopped(SessionOutcome::Transcribed { segments: 0 })
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_recognizer_is_created_once_across_sessions() {
        let (controller, _store, factory_calls, _) =
            controller_with(vec![long_frame()], vec!["hi".to_string()]);

        controller.toggle();
        controller.toggle();
        controller.toggle();
        controller.toggle();

        assert_eq!(factory_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_when_idle_is_a_no_op() {
        let (controller, _, _, _) = controller_with(vec![], vec![]);
        assert_eq!(controller.stop(), None);
        assert!(!controller.is_recording());
    }

    #[test]
    fn test_start_when_recording_is_a_no_op() {
        let (controller, _, _, _) = controller_with(vec![long_frame()], vec!["x".to_string()]);
        assert!(controller.start());
        assert!(!controller.start());
        controller.stop();
    }

    #[test]
    fn test_capture_failure_is_reported_and_returns_to_idle() {
        let store = Arc::new(TranscriptStore::new());
        let factory: RecognizerFactory = Box::new(|| panic!("must not be called"));
        let controller = MicSessionController::new(
            Arc::new(FakeSource { frames: vec![], fail: true }),
            factory,
            Arc::clone(&store),
            MicConfig::default(),
        );

        controller.toggle();
        let outcome = controller.toggle();

        match outcome {
            ToggleOutcome::Stopped(SessionOutcome::Failed(msg)) => {
                assert!(msg.contains("no input device"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(store.is_empty());
        assert!(!controller.is_recording());
    }
}
