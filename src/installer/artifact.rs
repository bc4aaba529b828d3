//! Artifact download and unpacking
//!
//! The archive is streamed to a temp file next to the install tree, unpacked
//! into a staging directory, and only then moved over the previous tree.
//! A failed download or a corrupt archive leaves the old install untouched.

use crate::installer::release::USER_AGENT;
use crate::types::{ProgressSink, UpdateError};
use async_trait::async_trait;
use futures::StreamExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, info};
use zip::ZipArchive;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Puts a downloaded release asset into an install directory
#[async_trait]
pub trait ArtifactInstaller: Send + Sync {
    async fn install(
        &self,
        download_url: &str,
        destination: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<(), UpdateError>;
}

/// Installs zip archives over HTTP
pub struct ZipInstaller {
    client: reqwest::Client,
}

impl ZipInstaller {
    pub fn new() -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| UpdateError::Download(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn download(
        &self,
        download_url: &str,
        target: &mut tokio::fs::File,
        progress: &dyn ProgressSink,
    ) -> Result<u64, UpdateError> {
        let url = url::Url::parse(download_url)
            .map_err(|e| UpdateError::Download(format!("Invalid URL {}: {}", download_url, e)))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpdateError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UpdateError::Download(format!(
                "HTTP {} for {}",
                response.status(),
                download_url
            )));
        }

        let mut tracker = ProgressTracker::new(response.content_length(), progress);
        let mut stream = response.bytes_stream();

        loop {
            let chunk = match timeout(INACTIVITY_TIMEOUT, stream.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(UpdateError::Download(e.to_string())),
                Ok(None) => break,
                Err(_) => {
                    return Err(UpdateError::Download(format!(
                        "No data received for {} seconds after {} bytes",
                        INACTIVITY_TIMEOUT.as_secs(),
                        tracker.downloaded
                    )))
                }
            };

            target.write_all(&chunk).await?;
            tracker.advance(chunk.len() as u64);
        }

        target.flush().await?;
        tracker.finish();

        Ok(tracker.downloaded)
    }
}

#[async_trait]
impl ArtifactInstaller for ZipInstaller {
    async fn install(
        &self,
        download_url: &str,
        destination: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<(), UpdateError> {
        tokio::fs::create_dir_all(destination).await?;

        let archive = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(destination)?;
        let mut target = tokio::fs::File::from_std(archive.as_file().try_clone()?);

        let bytes = self.download(download_url, &mut target, progress).await?;
        drop(target);
        info!("Downloaded {} bytes from {}", bytes, download_url);

        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || unpack(archive.path(), &destination))
            .await
            .map_err(|e| UpdateError::Archive(format!("Unpack task failed: {}", e)))?
    }
}

/// Emits monotonically non-decreasing percentages
struct ProgressTracker<'a> {
    total: Option<u64>,
    downloaded: u64,
    last_percent: Option<u8>,
    sink: &'a dyn ProgressSink,
}

impl<'a> ProgressTracker<'a> {
    fn new(total: Option<u64>, sink: &'a dyn ProgressSink) -> Self {
        let mut tracker = Self {
            total: total.filter(|t| *t > 0),
            downloaded: 0,
            last_percent: None,
            sink,
        };
        tracker.emit(0);
        tracker
    }

    fn advance(&mut self, bytes: u64) {
        self.downloaded += bytes;
        if let Some(total) = self.total {
            let percent = (self.downloaded.saturating_mul(100) / total).min(100) as u8;
            self.emit(percent);
        }
    }

    fn finish(&mut self) {
        self.emit(100);
    }

    fn emit(&mut self, percent: u8) {
        if self.last_percent.is_some_and(|last| percent <= last) {
            return;
        }
        self.last_percent = Some(percent);
        self.sink.on_progress(percent);
    }
}

fn archive_error(e: zip::result::ZipError) -> UpdateError {
    UpdateError::Archive(e.to_string())
}

/// Unpack into a staging dir, then swap the staged entries into place
fn unpack(archive_path: &Path, destination: &Path) -> Result<(), UpdateError> {
    let file = fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(archive_error)?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(destination)?;
    archive.extract(staging.path()).map_err(archive_error)?;
    debug!("Unpacked {} entries into staging", archive.len());

    for entry in fs::read_dir(staging.path())? {
        let entry = entry?;
        let target: PathBuf = destination.join(entry.file_name());

        if target.is_dir() {
            fs::remove_dir_all(&target)?;
        } else if target.exists() {
            fs::remove_file(&target)?;
        }

        fs::rename(entry.path(), &target)?;
    }

    Ok(())
}
