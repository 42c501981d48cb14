use anyhow::{Context, Result};
use std::path::Path;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Speech-to-text over a finished session's samples. Implementations hold
/// the loaded model; the controller creates one lazily on first use.
pub trait SpeechRecognizer: Send {
    /// Returns one transcribed segment per element.
    fn transcribe(&mut self, samples: &[f32], language: &str) -> Result<Vec<String>>;
}

pub struct WhisperRecognizer {
    context: WhisperContext,
}

impl WhisperRecognizer {
    pub fn load(model_path: &Path) -> Result<Self> {
        tracing::info!("Loading speech model from {:?}", model_path);
        let path_str = model_path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Speech model path is not valid UTF-8"))?;
        let context = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .context("Failed to load speech model")?;
        tracing::info!("Speech model loaded");
        Ok(Self { context })
    }
}

impl SpeechRecognizer for WhisperRecognizer {
    fn transcribe(&mut self, samples: &[f32], language: &str) -> Result<Vec<String>> {
        let mut state = self
            .context
            .create_state()
            .context("Failed to create recognizer state")?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_language(Some(language));

        state.full(params, samples).context("Transcription failed")?;

        let num_segments = state.full_n_segments();
        let mut segments = Vec::with_capacity(num_segments as usize);
        for i in 0..num_segments {
            if let Some(segment) = state.get_segment(i) {
                let text = segment.to_str().context("Segment text was not UTF-8")?;
                segments.push(text.to_string());
            }
        }
        Ok(segments)
    }
}
