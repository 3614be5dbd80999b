use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::core::error::{PluginError, PluginResult};

/// Progress report sent while an archive streams to disk.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DownloadProgress {
    pub url: String,
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
    pub file_name: String,
}

/// Writes the archive behind a URL to a final path.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Download `url` to `dest`, verifying SHA-1 when one is known.
    /// Returns the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path, sha1: Option<&str>) -> PluginResult<u64>;
}

/// Streams archives over HTTP straight to their destination.
pub struct HttpArchiveFetcher {
    client: Client,
    progress: Option<UnboundedSender<DownloadProgress>>,
}

impl HttpArchiveFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sender: UnboundedSender<DownloadProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn report(&self, url: &str, dest: &Path, bytes_downloaded: u64, total_bytes: Option<u64>) {
        if let Some(sender) = &self.progress {
            let file_name = dest
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let _ = sender.send(DownloadProgress {
                url: url.to_string(),
                bytes_downloaded,
                total_bytes,
                file_name,
            });
        }
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch(&self, url: &str, dest: &Path, sha1: Option<&str>) -> PluginResult<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PluginError::io(parent, e))?;
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PluginError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();
        let mut hasher = Sha1::new();
        let mut written: u64 = 0;

        // Scoped so the handle is closed before the checksum decision.
        {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|e| PluginError::io(dest, e))?;
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                hasher.update(&chunk);
                file.write_all(&chunk)
                    .await
                    .map_err(|e| PluginError::io(dest, e))?;
                written += chunk.len() as u64;
                self.report(url, dest, written, total_bytes);
            }
            file.flush().await.map_err(|e| PluginError::io(dest, e))?;
        }

        if let Some(expected) = sha1 {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                let _ = tokio::fs::remove_file(dest).await;
                return Err(PluginError::Sha1Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        debug!("Downloaded: {} -> {:?} ({} bytes)", url, dest, written);
        Ok(written)
    }
}

/// SHA-1 of bytes already in memory, hex encoded.
pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-1 of a file on disk.
pub async fn file_sha1(path: &Path) -> PluginResult<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PluginError::io(path, e))?;
    Ok(sha1_hex(&bytes))
}
