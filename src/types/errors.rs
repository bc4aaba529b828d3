use std::path::PathBuf;
use thiserror::Error;

/// Failures while getting the server onto disk.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Could not fetch from release index: {0}")]
    Network(String),

    #[error("Latest release {tag} of {project} does not contain the asset '{asset}'")]
    MissingAsset {
        project: String,
        tag: String,
        asset: String,
    },

    #[error("Release tag '{0}' is not a valid semantic version")]
    InvalidVersion(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while starting the server process.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to spawn {}: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind loopback port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Language server did not connect back on port {port}: {reason}")]
    NoClientConnected { port: u16, reason: String },

    #[error("Couldn't locate java in java home, $JAVA_HOME or $PATH")]
    JavaNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error handed to collaborators.
///
/// Update and launch failures stay separate variants so callers can tell
/// "could not get the software" apart from "could not run the software".
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not update/download language server: {0}")]
    Update(#[from] UpdateError),

    #[error("Could not launch language server: {0}")]
    Launch(#[from] LaunchError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_and_launch_failures_are_distinct() {
        let update: Error = UpdateError::Network("offline".to_string()).into();
        let launch: Error = LaunchError::JavaNotFound.into();

        assert!(update.to_string().starts_with("Could not update/download"));
        assert!(launch.to_string().starts_with("Could not launch"));
    }

    #[test]
    fn test_missing_asset_message_names_everything() {
        let err = UpdateError::MissingAsset {
            project: "kotlin-language-server".to_string(),
            tag: "1.3.0".to_string(),
            asset: "server.zip".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("kotlin-language-server"));
        assert!(msg.contains("1.3.0"));
        assert!(msg.contains("'server.zip'"));
    }
}
