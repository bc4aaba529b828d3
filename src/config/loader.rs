//! Configuration loader
//!
//! Search order (first existing file wins):
//! 1. Explicit path passed on the command line
//! 2. ./.lsvisor.toml (project-specific)
//! 3. $LSVISOR_CONFIG (environment variable)
//! 4. ~/.config/lsvisor/config.toml (user-global)
//!
//! With no file at all the built-in defaults are used.

use crate::config::SupervisorConfig;
use crate::types::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration, preferring `explicit` when given
    pub fn load(explicit: Option<&Path>) -> Result<SupervisorConfig, Error> {
        if let Some(path) = explicit {
            // An explicit path that does not exist is a user error, not a fallback
            info!("Loading configuration from {}", path.display());
            return Self::load_file(path);
        }

        for path in Self::candidates() {
            if path.exists() {
                info!("Loading configuration from {}", path.display());
                return Self::load_file(&path);
            }
        }

        debug!("No config file found, using built-in defaults");
        Ok(SupervisorConfig::default())
    }

    fn candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join(".lsvisor.toml"));
        }

        if let Ok(config_path) = std::env::var("LSVISOR_CONFIG") {
            candidates.push(PathBuf::from(config_path));
        }

        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("lsvisor").join("config.toml"));
        }

        candidates
    }

    pub fn load_file(path: &Path) -> Result<SupervisorConfig, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<SupervisorConfig, Error> {
        let config: SupervisorConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        // Fail early rather than at the first release query
        config.api_base_url()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;
    use crate::server::TransportConfig;
    use std::time::Duration;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = ConfigLoader::parse("").unwrap();
        assert_eq!(config.server.project, "kotlin-language-server");
        assert_eq!(config.cooldown(), Duration::from_secs(480));
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = ConfigLoader::parse(
            r#"
            [transport]
            kind = "tcp"
            port = 4711

            [launch.env]
            JAVA_OPTS = "-Xmx2g"
            "#,
        )
        .unwrap();

        assert_eq!(config.transport.kind, TransportKind::Tcp);
        assert_eq!(config.transport_config(), TransportConfig::Tcp { port: 4711 });
        assert_eq!(config.transport.connect_timeout_secs, 30);
        assert_eq!(config.launch.env.get("JAVA_OPTS").map(String::as_str), Some("-Xmx2g"));
        assert_eq!(config.server.asset_name, "server.zip");
    }

    #[test]
    fn test_invalid_api_base_is_rejected() {
        let result = ConfigLoader::parse(
            r#"
            [server]
            api_base = "not a url"
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_transport_is_rejected() {
        let result = ConfigLoader::parse(
            r#"
            [transport]
            kind = "pipe"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_path_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lsvisor.toml");
        std::fs::write(
            &path,
            r#"
            [install]
            dir = "/tmp/lsvisor-test/./install"
            cooldown_secs = 10
            "#,
        )
        .unwrap();

        let config = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(config.cooldown(), Duration::from_secs(10));
        assert_eq!(
            config.install_dir().unwrap(),
            PathBuf::from("/tmp/lsvisor-test/install")
        );
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigLoader::load(Some(&dir.path().join("nope.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
