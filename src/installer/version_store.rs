//! Persisted record of the installed server build

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RECORD_FILE: &str = "SERVER-INFO";

/// Version and last release-check time of the installed artifact.
///
/// `last_update` is in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledArtifactInfo {
    pub version: Version,
    #[serde(rename = "lastUpdate")]
    pub last_update: i64,
}

impl Default for InstalledArtifactInfo {
    /// "Nothing installed": version 0.0.0, checked at the beginning of time
    fn default() -> Self {
        Self {
            version: Version::new(0, 0, 0),
            last_update: i64::MIN,
        }
    }
}

/// Reads and writes the record file inside an install directory
#[derive(Debug, Clone)]
pub struct VersionStore {
    install_dir: PathBuf,
}

impl VersionStore {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn record_path(&self) -> PathBuf {
        self.install_dir.join(RECORD_FILE)
    }

    /// The installed record, or `None` when nothing usable is on disk
    pub fn read(&self) -> Option<InstalledArtifactInfo> {
        let path = self.record_path();

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<InstalledArtifactInfo>(&content) {
            Ok(info) => {
                debug!("Installed server version {}", info.version);
                Some(info)
            }
            Err(e) => {
                warn!("Ignoring invalid server info in {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Like `read`, but falls back to the "nothing installed" default
    pub fn load(&self) -> InstalledArtifactInfo {
        self.read().unwrap_or_default()
    }

    /// Write via a temp file and rename so a crash keeps the old record
    pub fn save(&self, info: &InstalledArtifactInfo) -> std::io::Result<()> {
        fs::create_dir_all(&self.install_dir)?;

        let content = serde_json::to_vec(info).map_err(std::io::Error::other)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.install_dir)?;
        tmp.write_all(&content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.record_path()).map_err(|e| e.error)?;

        debug!("Saved server info: {} @ {}", info.version, info.last_update);
        Ok(())
    }
}
