//! Release index queries

use crate::types::UpdateError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const USER_AGENT: &str = concat!("lsvisor/", env!("CARGO_PKG_VERSION"));

const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Latest published release, fetched fresh every time
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteRelease {
    #[serde(rename = "tag_name")]
    pub tag: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

impl RemoteRelease {
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

/// Where the latest release comes from. No retries: callers decide.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn fetch_latest(&self, project: &str) -> Result<RemoteRelease, UpdateError>;
}

/// GitHub-style `releases/latest` endpoint
pub struct GithubReleases {
    client: reqwest::Client,
    api_base: Url,
    owner: String,
}

impl GithubReleases {
    pub fn new(api_base: Url, owner: impl Into<String>) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(QUERY_TIMEOUT)
            .build()
            .map_err(|e| UpdateError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base,
            owner: owner.into(),
        })
    }

    fn latest_url(&self, project: &str) -> Result<Url, UpdateError> {
        let path = format!("repos/{}/{}/releases/latest", self.owner, project);
        let mut base = self.api_base.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(&path)
            .map_err(|e| UpdateError::Network(format!("Invalid release URL: {}", e)))
    }
}

#[async_trait]
impl ReleaseSource for GithubReleases {
    async fn fetch_latest(&self, project: &str) -> Result<RemoteRelease, UpdateError> {
        let url = self.latest_url(project)?;
        debug!("Querying {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpdateError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UpdateError::Network(format!(
                "release index returned HTTP {} for {}",
                response.status(),
                project
            )));
        }

        response
            .json::<RemoteRelease>()
            .await
            .map_err(|e| UpdateError::Network(format!("Malformed release response: {}", e)))
    }
}
