//! Configuration system for lsvisor
//!
//! The collaborator (the CLI, or an editor integration) builds a
//! `SupervisorConfig` once and hands plain values down to the core.

mod defaults;
mod loader;
mod settings;

pub use defaults::{DEFAULT_API_BASE, DEFAULT_COOLDOWN_SECS};
pub use loader::ConfigLoader;
pub use settings::{
    InstallSettings, JavaSettings, LaunchSettings, ServerSettings, SupervisorConfig,
    TransportKind, TransportSettings,
};
