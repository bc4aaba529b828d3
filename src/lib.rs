//! lsvisor - language server supervisor
//!
//! Keeps an external language server installed and current, launches it over
//! stdio or a loopback socket, and hands back a session that can be
//! restarted in place.

pub mod activation;
pub mod config;
pub mod installer;
pub mod server;
pub mod types;

pub use activation::{activate, update};
pub use config::{ConfigLoader, SupervisorConfig};
pub use installer::{UpdateOrchestrator, UpdateOutcome, VersionStore};
pub use server::{LaunchConfig, ServerSession, SessionState, TransportConfig};
pub use types::{Error, LaunchError, UpdateError};
