use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::resources::{Asset, AssetKind};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub assets: AssetsConfig,
    pub backend: BackendConfig,
    pub capture: CaptureConfig,
    pub mic: MicConfig,
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AssetsConfig {
    /// Root for models and binaries. Defaults to ~/.local/share/promptdeck.
    pub data_dir: Option<String>,
    pub model_url: String,
    pub speech_model_url: String,
    pub server_archive_url: String,
    pub runtime_archive_url: String,
    /// File name of the inference server binary inside the extracted archive.
    pub server_binary: String,
    /// File the runtime archive is expected to provide; used as its existence marker.
    pub runtime_marker: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            model_url:
                "https://huggingface.co/unsloth/Qwen3-Coder-30B-A3B-Instruct-GGUF/resolve/main/Qwen3-Coder-30B-A3B-Instruct-Q4_K_M.gguf?download=true"
                    .to_string(),
            speech_model_url:
                "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base-q8_0.bin?download=true"
                    .to_string(),
            server_archive_url:
                "https://github.com/ggml-org/llama.cpp/releases/download/b6081/llama-b6081-bin-ubuntu-x64.tar.gz"
                    .to_string(),
            runtime_archive_url:
                "https://github.com/ggml-org/llama.cpp/releases/download/b6081/cudart-llama-bin-ubuntu-x64.tar.gz"
                    .to_string(),
            server_binary: "llama-server".to_string(),
            runtime_marker: "libggml.so".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub port: u16,
    pub gpu_layers: u32,
    pub ctx_size: u32,
    pub probe_interval_ms: u64,
    pub max_probe_attempts: u32,
    pub completion_timeout_seconds: u64,
    pub temperature: f64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            port: 11434,
            gpu_layers: 30,
            ctx_size: 8192,
            probe_interval_ms: 1000,
            max_probe_attempts: 120,
            completion_timeout_seconds: 600,
            temperature: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Where adjusted screenshots are written. Defaults to ~/Pictures/Screenshots.
    pub screenshots_dir: Option<String>,
    pub display_contrast: f32,
    pub region_contrast: f32,
    pub brightness: f32,
    pub ocr_language: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            screenshots_dir: None,
            display_contrast: 2.0,
            region_contrast: 3.0,
            brightness: 0.5,
            ocr_language: "eng".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MicConfig {
    pub language: String,
    pub sample_rate: u32,
    /// Sessions shorter than this many raw PCM bytes are discarded.
    pub min_audio_bytes: usize,
}

impl Default for MicConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            sample_rate: 16000,
            min_audio_bytes: 32000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PromptConfig {
    /// Target programming language named in the system prompt.
    pub language: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            language: "C#".to_string(),
        }
    }
}

impl Config {
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.assets.data_dir {
            return Ok(PathBuf::from(dir));
        }
        dirs::data_dir()
            .map(|p| p.join("promptdeck"))
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))
    }

    pub fn server_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("llama"))
    }

    pub fn model_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(filename_from_url(&self.assets.model_url)?))
    }

    pub fn speech_model_path(&self) -> Result<PathBuf> {
        Ok(self
            .data_dir()?
            .join(filename_from_url(&self.assets.speech_model_url)?))
    }

    pub fn server_exe_path(&self) -> Result<PathBuf> {
        Ok(self.server_dir()?.join(&self.assets.server_binary))
    }

    pub fn completion_url(&self) -> String {
        format!("http://127.0.0.1:{}/completion", self.backend.port)
    }

    pub fn screenshots_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.capture.screenshots_dir {
            return Ok(PathBuf::from(dir));
        }
        dirs::picture_dir()
            .map(|p| p.join("Screenshots"))
            .ok_or_else(|| anyhow::anyhow!("Could not determine pictures directory"))
    }

    /// Everything that must exist on disk before the backend can start.
    pub fn required_assets(&self) -> Result<Vec<Asset>> {
        let server_dir = self.server_dir()?;
        Ok(vec![
            Asset {
                url: self.assets.model_url.clone(),
                local_path: self.model_path()?,
                kind: AssetKind::File,
            },
            Asset {
                url: self.assets.speech_model_url.clone(),
                local_path: self.speech_model_path()?,
                kind: AssetKind::File,
            },
            Asset {
                url: self.assets.server_archive_url.clone(),
                local_path: server_dir.join(&self.assets.server_binary),
                kind: AssetKind::Archive,
            },
            Asset {
                url: self.assets.runtime_archive_url.clone(),
                local_path: server_dir.join(&self.assets.runtime_marker),
                kind: AssetKind::Archive,
            },
        ])
    }
}

/// Extract the trailing path segment of a download URL, dropping any query string.
pub fn filename_from_url(url: &str) -> Result<String> {
    let path = url.split('?').next().unwrap_or(url);
    let name = path
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Invalid asset URL: cannot extract filename"))?;
    Ok(name.to_string())
}

pub fn load_config() -> Result<Config> {
    let config_path = get_config_path();

    if !config_path.exists() {
        tracing::info!("Config file not found at {:?}, using defaults", config_path);
        return Ok(Config::default());
    }

    tracing::info!("Loading config from {:?}", config_path);
    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

    tracing::info!("Config loaded successfully");
    Ok(config)
}

fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .expect("Failed to get config directory")
        .join("promptdeck")
        .join("config.toml")
}
