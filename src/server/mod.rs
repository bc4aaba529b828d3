//! Server process launching and session management

mod java;
mod launcher;
mod platform;
mod session;
mod transport;

pub use java::{find_java, find_in_java_home, JavaInstall};
pub use launcher::{exit_line, ExitHook, LaunchConfig, RunningServer};
pub use platform::{correct_binname, correct_script_name, ensure_executable};
pub use session::{ServerSession, SessionState};
pub use transport::{ServerTransport, TransportConfig, TransportReader, TransportWriter};
