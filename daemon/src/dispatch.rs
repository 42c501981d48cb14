use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{BackendConfig, PromptConfig};
use crate::transcript::TranscriptStore;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("LLM request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Clipboard error: {0}")]
    Clipboard(String),
}

/// Where the model's answer ends up. The production sink is the system
/// clipboard.
pub trait TextSink: Send + Sync {
    fn deliver(&self, text: &str) -> Result<(), DispatchError>;
}

pub struct SystemClipboard;

impl TextSink for SystemClipboard {
    fn deliver(&self, text: &str) -> Result<(), DispatchError> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| DispatchError::Clipboard(e.to_string()))?;
        clipboard
            .set_text(text)
            .map_err(|e| DispatchError::Clipboard(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Answer delivered to the sink.
    Dispatched(String),
    /// Nothing accumulated, no request made.
    Empty,
    /// Backend answered but the body had no usable content field.
    NoContent,
}

/// Turns the accumulated transcript into one chat-templated completion
/// request and routes the answer to the text sink. Transcripts survive a
/// dispatch; only an explicit clear empties them.
pub struct PromptDispatcher {
    client: reqwest::Client,
    completion_url: String,
    store: Arc<TranscriptStore>,
    sink: Box<dyn TextSink>,
    language: std::sync::Mutex<String>,
    temperature: f64,
}

impl PromptDispatcher {
    pub fn new(
        completion_url: String,
        store: Arc<TranscriptStore>,
        sink: Box<dyn TextSink>,
        backend: &BackendConfig,
        prompt: &PromptConfig,
    ) -> Result<Self, DispatchError> {
        // Large models can take minutes per answer; the timeout covers the
        // whole request.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(backend.completion_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            completion_url,
            store,
            sink,
            language: std::sync::Mutex::new(prompt.language.clone()),
            temperature: backend.temperature,
        })
    }

    pub fn language(&self) -> String {
        self.language.lock().unwrap().clone()
    }

    pub fn set_language(&self, language: &str) {
        *self.language.lock().unwrap() = language.to_string();
    }

    pub async fn dispatch(&self) -> Result<DispatchOutcome, DispatchError> {
        if self.store.is_empty() {
            info!("Nothing to send");
            return Ok(DispatchOutcome::Empty);
        }

        let aggregate = self.store.aggregate();
        let prompt = build_prompt(&self.language(), &aggregate);
        info!("Sending {} chars to backend, waiting for completion", aggregate.len());

        let response = self
            .client
            .post(&self.completion_url)
            .json(&json!({
                "prompt": prompt,
                "temperature": self.temperature,
            }))
            .send()
            .await?;
        let body: serde_json::Value = response.json().await?;

        match body.get("content").and_then(|v| v.as_str()) {
            Some(content) => {
                info!("LLM response ({} chars)", content.len());
                self.sink.deliver(content)?;
                Ok(DispatchOutcome::Dispatched(content.to_string()))
            }
            None => {
                warn!("Backend response had no usable content");
                Ok(DispatchOutcome::NoContent)
            }
        }
    }
}

/// Qwen chat template with a fixed coding-assistant system prompt.
pub fn build_prompt(language: &str, user_input: &str) -> String {
    let system = format!(
        "You are a senior {language} developer.\
         Solve the following problem using the most efficient algorithm you know.\
         Time complexity should be optimal (O(n) if possible).\
         Return only clean, working {language} code."
    );
    format!(
        "<|im_start|>system\n{system}<|im_end|>\n<|im_start|>user\n{user_input}<|im_end|>\n<|im_start|>assistant\n"
    )
}
