//! Update orchestration
//!
//! Decides whether the installed server is stale and applies an update.
//! Release queries are rate limited upstream, so at most one query happens
//! per cool-down window no matter how often `ensure_up_to_date` is called.

use crate::installer::artifact::{ArtifactInstaller, ZipInstaller};
use crate::installer::release::{GithubReleases, ReleaseSource};
use crate::installer::version_store::{InstalledArtifactInfo, VersionStore};
use crate::types::{Status, UpdateError};
use semver::Version;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Source of "now" in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Static description of the artifact being kept up to date
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub display_name: String,
    pub project: String,
    pub asset_name: String,
}

/// Which branch `ensure_up_to_date` took
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Checked recently, no query made
    CoolingDown,
    /// Release index unreachable but a usable install exists
    Offline { installed: Version },
    /// Latest release is not newer than what is installed
    UpToDate { installed: Version },
    Installed { version: Version },
}

pub struct UpdateOrchestrator {
    artifact: ArtifactSpec,
    store: VersionStore,
    releases: Arc<dyn ReleaseSource>,
    installer: Arc<dyn ArtifactInstaller>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl UpdateOrchestrator {
    /// Orchestrator backed by the GitHub release index and zip installer
    pub fn new(
        artifact: ArtifactSpec,
        store: VersionStore,
        api_base: Url,
        owner: &str,
        cooldown: Duration,
    ) -> Result<Self, UpdateError> {
        Ok(Self::with_parts(
            artifact,
            store,
            Arc::new(GithubReleases::new(api_base, owner)?),
            Arc::new(ZipInstaller::new()?),
            Arc::new(SystemClock),
            cooldown,
        ))
    }

    pub fn with_parts(
        artifact: ArtifactSpec,
        store: VersionStore,
        releases: Arc<dyn ReleaseSource>,
        installer: Arc<dyn ArtifactInstaller>,
        clock: Arc<dyn Clock>,
        cooldown: Duration,
    ) -> Self {
        Self {
            artifact,
            store,
            releases,
            installer,
            clock,
            cooldown,
        }
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    pub async fn ensure_up_to_date(&self, status: &dyn Status) -> Result<UpdateOutcome, UpdateError> {
        let installed = self.store.read();
        let current = installed.clone().unwrap_or_default();

        let now = self.clock.now_millis();
        let elapsed = now.saturating_sub(current.last_update);
        let cooldown = i64::try_from(self.cooldown.as_millis()).unwrap_or(i64::MAX);
        if elapsed < cooldown {
            info!(
                "Skipping {} update check, last check {}s ago",
                self.artifact.display_name,
                elapsed / 1000
            );
            return Ok(UpdateOutcome::CoolingDown);
        }

        info!(
            "Querying release index for new {} version...",
            self.artifact.display_name
        );

        let release = match self.releases.fetch_latest(&self.artifact.project).await {
            Ok(release) => release,
            Err(e) => match installed {
                None => return Err(e),
                Some(info) => {
                    // Offline with a working install is fine
                    warn!("{}", e);
                    return Ok(UpdateOutcome::Offline {
                        installed: info.version,
                    });
                }
            },
        };

        let latest = parse_tag(&release.tag)?;

        if latest <= current.version {
            info!(
                "{} {} is up to date (latest {})",
                self.artifact.display_name, current.version, latest
            );
            self.persist(current.version.clone(), now)?;
            return Ok(UpdateOutcome::UpToDate {
                installed: current.version,
            });
        }

        let asset = release
            .asset(&self.artifact.asset_name)
            .ok_or_else(|| UpdateError::MissingAsset {
                project: self.artifact.project.clone(),
                tag: release.tag.clone(),
                asset: self.artifact.asset_name.clone(),
            })?;

        let display_name = &self.artifact.display_name;
        status.update(&format!("Downloading {} {}...", display_name, latest));
        let progress = |percent: u8| {
            status.update(&format!(
                "Downloading {} {} :: {}%",
                display_name, latest, percent
            ));
        };

        self.installer
            .install(&asset.download_url, self.store.install_dir(), &progress)
            .await?;

        status.update(&format!("Initializing {}...", display_name));

        self.persist(latest.clone(), now)?;
        info!("Installed {} {}", display_name, latest);

        Ok(UpdateOutcome::Installed { version: latest })
    }

    fn persist(&self, version: Version, now: i64) -> Result<(), UpdateError> {
        self.store.save(&InstalledArtifactInfo {
            version,
            last_update: now,
        })?;
        Ok(())
    }
}

/// Parse a release tag, tolerating a leading `v`
fn parse_tag(tag: &str) -> Result<Version, UpdateError> {
    let trimmed = tag.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(bare).map_err(|_| UpdateError::InvalidVersion(tag.to_string()))
}
