use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use sha1::{Digest, Sha1};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::engine::models::VersionManifest;
use crate::util::{CANCELLED, cancel_requested, cancelled, format_speed};

#[cfg(test)]
pub mod test_server;

pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";
const USER_AGENT: &str = concat!("cat-launcher/", env!("CARGO_PKG_VERSION"));
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// What a downloaded file has to match before it is moved into place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileCheck {
    pub size: Option<u64>,
    /// Lowercase hex SHA-1 as published by Mojang.
    pub sha1: Option<String>,
}

impl FileCheck {
    pub fn new(size: Option<u64>, sha1: Option<&str>) -> Self {
        Self {
            size,
            sha1: sha1
                .map(str::trim)
                .filter(|hash| !hash.is_empty())
                .map(str::to_ascii_lowercase),
        }
    }
}

#[derive(Clone)]
pub struct NetworkClient {
    client: Client,
    attempts: u32,
}

impl NetworkClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(5 * 60))
            .build()
            .unwrap_or_else(|err| {
                warn!("network client: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self {
            client,
            attempts: 3,
        }
    }

    pub async fn fetch_manifest(&self) -> Result<VersionManifest, String> {
        self.fetch_json(VERSION_MANIFEST_URL).await
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, String> {
        let text = self.fetch_text(url).await?;
        serde_json::from_str(&text).map_err(|e| format!("invalid JSON from {url}: {e}"))
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String, String> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request to {url} failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("request to {url} failed: {e}"))?
            .text()
            .await
            .map_err(|e| format!("reading {url} failed: {e}"))
    }

    /// Download `url` to `dest`, retrying a bounded number of times.
    /// A raised cancel flag aborts the transfer even while the server is silent.
    pub async fn download_to_path(
        &self,
        url: &str,
        dest: &Path,
        check: &FileCheck,
        cancel: &Option<Arc<AtomicBool>>,
    ) -> Result<(), String> {
        let partial = partial_path(dest);
        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            let outcome = tokio::select! {
                biased;
                _ = cancelled(cancel) => Err(CANCELLED.to_owned()),
                result = self.download_once(url, dest, &partial, check) => result,
            };
            match outcome {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let _ = fs::remove_file(&partial).await;
                    if cancel_requested(cancel) {
                        debug!("download: {url} cancelled");
                        return Err(CANCELLED.into());
                    }
                    warn!(
                        "download: attempt {attempt}/{} for {url} failed: {err}",
                        self.attempts
                    );
                    last_error = err;
                }
            }
            if attempt < self.attempts {
                tokio::select! {
                    _ = cancelled(cancel) => return Err(CANCELLED.into()),
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }
        Err(last_error)
    }

    async fn download_once(
        &self,
        url: &str,
        dest: &Path,
        partial: &Path,
        check: &FileCheck,
    ) -> Result<(), String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("download request failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("download status error: {e}"))?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("failed to create download dir: {e}"))?;
        }
        let mut file = File::create(partial)
            .await
            .map_err(|e| format!("failed to create file: {e}"))?;

        let expected_size = check.size.or(response.content_length());
        let mut stream = response.bytes_stream();
        let mut hasher = Sha1::new();
        let mut downloaded: u64 = 0;
        let started = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| format!("stream error: {e}"))?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| format!("write error: {e}"))?;
            downloaded += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| format!("flush error: {e}"))?;
        drop(file);

        if let Some(expected) = expected_size
            && downloaded != expected
        {
            return Err(format!(
                "size mismatch: expected {expected} bytes, received {downloaded}"
            ));
        }
        if let Some(expected) = check.sha1.as_deref() {
            let actual = format!("{:x}", hasher.finalize());
            if actual != expected {
                return Err(format!(
                    "checksum mismatch: expected {expected}, got {actual}"
                ));
            }
        }

        fs::rename(partial, dest)
            .await
            .map_err(|e| format!("failed to move download into place: {e}"))?;

        let elapsed = started.elapsed().as_secs_f32();
        if elapsed > 0.0 {
            debug!(
                "download: {} ({} bytes, {})",
                dest.display(),
                downloaded,
                format_speed(downloaded as f32 / elapsed)
            );
        }
        Ok(())
    }
}

/// `<dest>.part`, next to the destination.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// True when `path` exists and, if a size is known, has exactly that size.
/// Hashes are only checked on download.
pub async fn is_complete(path: &Path, check: &FileCheck) -> bool {
    match fs::metadata(path).await {
        Ok(meta) => meta.is_file() && check.size.is_none_or(|size| meta.len() == size),
        Err(_) => false,
    }
}
