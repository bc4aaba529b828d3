//! Supervisor configuration types

use crate::server::{correct_script_name, LaunchConfig, TransportConfig};
use crate::types::Error;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub server: ServerSettings,
    pub install: InstallSettings,
    pub transport: TransportSettings,
    pub launch: LaunchSettings,
    pub java: JavaSettings,
}

/// Which server to fetch and how to find it once unpacked
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub display_name: String,
    /// Project name on the release index
    pub project: String,
    pub owner: String,
    pub asset_name: String,
    /// Launch script relative to the install directory, without platform suffix
    pub launch_script: PathBuf,
    /// User-provided server executable; disables downloading entirely
    pub path: Option<PathBuf>,
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallSettings {
    pub dir: Option<PathBuf>,
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Tcp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub kind: TransportKind,
    /// Loopback port for tcp transport, 0 picks any free port
    pub port: u16,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSettings {
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JavaSettings {
    /// One or more java homes separated by the platform path separator
    pub home: Option<String>,
    pub required: bool,
}

impl SupervisorConfig {
    /// Directory holding the unpacked server and its version record
    pub fn install_dir(&self) -> Result<PathBuf, Error> {
        if let Some(dir) = &self.install.dir {
            return Ok(dir.clean());
        }

        let data_dir = dirs::data_dir().ok_or_else(|| {
            Error::Config("Cannot determine data directory for the install dir".to_string())
        })?;

        Ok(data_dir.join("lsvisor").join(&self.server.project))
    }

    /// Whether the user pointed us at their own server build
    pub fn has_custom_path(&self) -> bool {
        self.server
            .path
            .as_ref()
            .is_some_and(|path| !path.as_os_str().is_empty())
    }

    /// The executable to launch: the custom path, or the installed launch script
    pub fn server_executable(&self, install_dir: &Path) -> PathBuf {
        if self.has_custom_path() {
            if let Some(path) = &self.server.path {
                return path.clean();
            }
        }

        let script = correct_script_name(&self.server.launch_script);
        install_dir.join(script).clean()
    }

    pub fn api_base_url(&self) -> Result<Url, Error> {
        Url::parse(&self.server.api_base).map_err(|e| {
            Error::Config(format!("Invalid api_base '{}': {}", self.server.api_base, e))
        })
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.install.cooldown_secs)
    }

    pub fn transport_config(&self) -> TransportConfig {
        match self.transport.kind {
            TransportKind::Stdio => TransportConfig::Stdio,
            TransportKind::Tcp => TransportConfig::Tcp {
                port: self.transport.port,
            },
        }
    }

    /// Build the immutable launch configuration for `executable`
    pub fn launch_config(&self, executable: PathBuf) -> LaunchConfig {
        LaunchConfig {
            executable,
            transport: self.transport_config(),
            working_dir: self.launch.working_dir.as_ref().map(|dir| dir.clean()),
            env: self.launch.env.clone(),
            connect_timeout: Duration::from_secs(self.transport.connect_timeout_secs),
            shutdown_grace: Duration::from_millis(self.launch.shutdown_grace_ms),
        }
    }
}
