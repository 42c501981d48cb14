use serde_json::json;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::BackendConfig;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to start inference server: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Inference server not ready after {0} probe attempts")]
    NeverReady(u32),
}

/// Owns the llama-server child process. Shutdown kills the held handle
/// first, then sweeps any same-named strays left over from earlier runs.
pub struct BackendSupervisor {
    child: Option<Child>,
    binary_name: String,
}

impl BackendSupervisor {
    pub fn spawn(exe_path: &Path, model_path: &Path, config: &BackendConfig) -> Result<Self, BackendError> {
        info!("Starting inference server: {:?}", exe_path);
        let child = Command::new(exe_path)
            .args(server_args(model_path, config))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        info!("Inference server started with pid {}", child.id());

        let binary_name = exe_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "llama-server".to_string());

        Ok(Self {
            child: Some(child),
            binary_name,
        })
    }

    /// Kills the owned child, then any remaining process with the same
    /// executable name. Individual kill failures are logged and skipped;
    /// one unkillable stray must not abort the rest of the sweep.
    pub fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.kill() {
                Ok(()) => {
                    let _ = child.wait();
                    info!("Inference server stopped");
                }
                Err(e) => warn!("Failed to kill inference server handle: {}", e),
            }
        }

        let strays = list_pids_by_name(&self.binary_name);
        if strays.is_empty() {
            return;
        }
        info!("Sweeping {} stray {} process(es)", strays.len(), self.binary_name);
        let (attempted, failed) = sweep_orphans(&strays, kill_pid);
        if failed > 0 {
            warn!("Orphan sweep: {}/{} kills failed", failed, attempted);
        }
    }
}

impl Drop for BackendSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Command line for the inference server. The server is a hidden
/// implementation detail, so its own web UI and logging stay off.
pub fn server_args(model_path: &Path, config: &BackendConfig) -> Vec<std::ffi::OsString> {
    vec![
        "--model".into(),
        model_path.as_os_str().to_os_string(),
        "--port".into(),
        config.port.to_string().into(),
        "--n-gpu-layers".into(),
        config.gpu_layers.to_string().into(),
        "--ctx-size".into(),
        config.ctx_size.to_string().into(),
        "--no-webui".into(),
        "--log-disable".into(),
    ]
}

/// Kill each pid in turn. Returns (attempted, failed). Failures never
/// short-circuit the remaining pids.
pub fn sweep_orphans<F>(pids: &[u32], mut kill: F) -> (usize, usize)
where
    F: FnMut(u32) -> Result<(), String>,
{
    let mut failed = 0;
    for &pid in pids {
        if let Err(e) = kill(pid) {
            warn!("Failed to kill pid {}: {}", pid, e);
            failed += 1;
        }
    }
    (pids.len(), failed)
}

#[cfg(unix)]
pub fn list_pids_by_name(name: &str) -> Vec<u32> {
    let output = match Command::new("pgrep").arg("-x").arg(name).output() {
        Ok(o) => o,
        Err(e) => {
            warn!("pgrep unavailable, skipping orphan sweep: {}", e);
            return Vec::new();
        }
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

#[cfg(windows)]
pub fn list_pids_by_name(name: &str) -> Vec<u32> {
    let image = format!("{name}.exe");
    let output = match Command::new("tasklist")
        .args(["/FI", &format!("IMAGENAME eq {image}"), "/FO", "CSV", "/NH"])
        .output()
    {
        Ok(o) => o,
        Err(e) => {
            warn!("tasklist unavailable, skipping orphan sweep: {}", e);
            return Vec::new();
        }
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(',');
            let _image = fields.next()?;
            let pid = fields.next()?.trim_matches('"');
            pid.parse::<u32>().ok()
        })
        .collect()
}

#[cfg(unix)]
pub fn kill_pid(pid: u32) -> Result<(), String> {
    let status = Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status()
        .map_err(|e| e.to_string())?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("kill exited with {status}"))
    }
}

#[cfg(windows)]
pub fn kill_pid(pid: u32) -> Result<(), String> {
    let status = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .status()
        .map_err(|e| e.to_string())?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("taskkill exited with {status}"))
    }
}

/// Probe the completion endpoint until it returns a JSON body with a
/// non-empty "content" field. Transport errors, non-JSON bodies, and
/// contentless replies all count as one failed attempt; after
/// `max_attempts` failures the backend is declared dead. Returns the
/// number of attempts the successful probe took.
pub async fn await_ready(
    client: &reqwest::Client,
    url: &str,
    interval: Duration,
    max_attempts: u32,
) -> Result<u32, BackendError> {
    let payload = json!({
        "model": "Qwen",
        "prompt": "ping",
        "n_predict": 1,
    });

    for attempt in 1..=max_attempts {
        match client.post(url).json(&payload).send().await {
            Ok(response) => match response.json::<serde_json::Value>().await {
                Ok(body) => {
                    let content = body.get("content").and_then(|v| v.as_str()).unwrap_or("");
                    if !content.is_empty() {
                        info!("Inference server ready after {} probe(s)", attempt);
                        return Ok(attempt);
                    }
                    info!("Probe {}/{}: server up, model not ready", attempt, max_attempts);
                }
                Err(e) => {
                    info!("Probe {}/{}: unreadable response: {}", attempt, max_attempts, e);
                }
            },
            Err(e) => {
                info!("Probe {}/{}: {}", attempt, max_attempts, e);
            }
        }
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Err(BackendError::NeverReady(max_attempts))
}
