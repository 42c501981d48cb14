use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned status {0} for {1}")]
    BadStatus(reqwest::StatusCode, String),
    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Archive did not contain expected file {0:?}")]
    MissingFromArchive(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Downloaded file is the asset itself.
    File,
    /// Downloaded file is a .tar.gz that must be unpacked next to `local_path`.
    Archive,
}

/// One thing that must exist on disk before the daemon can serve requests.
/// For archives, `local_path` is the file whose presence proves the archive
/// was already unpacked.
#[derive(Debug, Clone)]
pub struct Asset {
    pub url: String,
    pub local_path: PathBuf,
    pub kind: AssetKind,
}

/// Emits a download percentage only when the integer value changes, so a
/// multi-gigabyte pull produces at most 101 log lines.
#[derive(Debug, Default)]
pub struct ProgressPercent {
    last: Option<u64>,
}

impl ProgressPercent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the percentage to report, or None when it has not crossed
    /// an integer boundary since the last report.
    pub fn update(&mut self, downloaded: u64, total: u64) -> Option<u64> {
        if total == 0 {
            return None;
        }
        let percent = (downloaded * 100) / total;
        if self.last == Some(percent) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }
}

pub struct Provisioner {
    client: reqwest::Client,
}

impl Provisioner {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    /// Downloads and unpacks every asset that is not already present.
    /// Assets already on disk are skipped without touching the network,
    /// so a restart after a crash resumes where it left off.
    pub async fn ensure(&self, assets: &[Asset]) -> Result<(), FetchError> {
        for asset in assets {
            if asset.local_path.exists() {
                info!("Asset already present: {:?}", asset.local_path);
                continue;
            }
            match asset.kind {
                AssetKind::File => self.fetch_file(asset).await?,
                AssetKind::Archive => self.fetch_archive(asset).await?,
            }
        }
        Ok(())
    }

    async fn fetch_file(&self, asset: &Asset) -> Result<(), FetchError> {
        if let Some(parent) = asset.local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp_path = asset.local_path.with_extension("part");
        if let Err(e) = self.download_to(&asset.url, &temp_path).await {
            // Leave nothing half-written behind.
            if temp_path.exists() {
                warn!("Cleaning up partial download: {:?}", temp_path);
                let _ = tokio::fs::remove_file(&temp_path).await;
            }
            return Err(e);
        }
        tokio::fs::rename(&temp_path, &asset.local_path).await?;
        info!("Asset ready: {:?}", asset.local_path);
        Ok(())
    }

    async fn fetch_archive(&self, asset: &Asset) -> Result<(), FetchError> {
        let dest_dir = asset
            .local_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        tokio::fs::create_dir_all(&dest_dir).await?;

        let archive_name = asset
            .url
            .split('?')
            .next()
            .unwrap_or(&asset.url)
            .rsplit('/')
            .next()
            .unwrap_or("archive.tar.gz")
            .to_string();
        let archive_path = dest_dir.join(format!("{archive_name}.part"));

        if let Err(e) = self.download_to(&asset.url, &archive_path).await {
            if archive_path.exists() {
                warn!("Cleaning up partial download: {:?}", archive_path);
                let _ = tokio::fs::remove_file(&archive_path).await;
            }
            return Err(e);
        }

        info!("Extracting {:?} into {:?}", archive_path, dest_dir);
        let extract_archive = archive_path.clone();
        let extract_dir = dest_dir.clone();
        tokio::task::spawn_blocking(move || extract_tar_gz(&extract_archive, &extract_dir))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))??;
        let _ = tokio::fs::remove_file(&archive_path).await;

        if !asset.local_path.exists() {
            return Err(FetchError::MissingFromArchive(asset.local_path.clone()));
        }
        info!("Asset ready: {:?}", asset.local_path);
        Ok(())
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        info!("Downloading {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::BadStatus(response.status(), url.to_string()));
        }

        let total_bytes = response.content_length();
        let mut downloaded = 0u64;
        let mut progress = ProgressPercent::new();
        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(dest).await?;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            downloaded += chunk.len() as u64;
            file.write_all(&chunk).await?;

            if let Some(total) = total_bytes {
                if let Some(percent) = progress.update(downloaded, total) {
                    info!("Download progress: {}% ({}/{} bytes)", percent, downloaded, total);
                }
            }
        }

        file.flush().await?;
        Ok(())
    }
}

/// Unpack a gzip-compressed tar archive into `dest_dir`, flattening any
/// single top-level directory the archive wraps its contents in.
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<(), FetchError> {
    let file = std::fs::File::open(archive_path)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        // Strip a leading "llama-b6081/" style wrapper directory so the
        // binaries land directly in dest_dir.
        let components: Vec<_> = path.components().collect();
        let stripped: PathBuf = if components.len() > 1 {
            components[1..].iter().collect()
        } else {
            path.clone()
        };
        if stripped.as_os_str().is_empty() {
            continue;
        }
        let dest = dest_dir.join(&stripped);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&dest)?;
    }
    Ok(())
}
