//! Built-in defaults
//!
//! Out of the box the supervisor manages the Kotlin language server
//! published on GitHub releases.

use crate::config::settings::{
    InstallSettings, JavaSettings, LaunchSettings, ServerSettings, TransportKind,
    TransportSettings,
};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Minimum interval between two release index queries
pub const DEFAULT_COOLDOWN_SECS: u64 = 480;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            display_name: "Kotlin Language Server".to_string(),
            project: "kotlin-language-server".to_string(),
            owner: "fwcd".to_string(),
            asset_name: "server.zip".to_string(),
            launch_script: PathBuf::from("server/bin/kotlin-language-server"),
            path: None,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            dir: None,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            kind: TransportKind::Stdio,
            port: 0,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            working_dir: None,
            env: BTreeMap::new(),
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl Default for JavaSettings {
    fn default() -> Self {
        Self {
            home: None,
            required: true,
        }
    }
}
