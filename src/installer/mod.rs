//! Server installer
//!
//! Keeps a language server build from a release index installed and up to
//! date inside a directory owned by this process.

mod artifact;
mod orchestrator;
mod release;
mod version_store;

pub use artifact::{ArtifactInstaller, ZipInstaller};
pub use orchestrator::{ArtifactSpec, Clock, SystemClock, UpdateOrchestrator, UpdateOutcome};
pub use release::{GithubReleases, ReleaseAsset, ReleaseSource, RemoteRelease, USER_AGENT};
pub use version_store::{InstalledArtifactInfo, VersionStore};
