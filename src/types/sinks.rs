//! Sinks the collaborator hands to the supervisor
//!
//! The supervisor never renders anything itself: status text, download
//! progress and server output all leave through these traits.

use std::sync::Mutex;
use tracing::info;

/// Line-oriented consumer of server output. Outlives every restart.
pub trait OutputSink: Send + Sync {
    fn append_line(&self, line: &str);
}

/// Short human-readable status updates (a status bar in an editor).
pub trait Status: Send + Sync {
    fn update(&self, message: &str);
}

/// Receives download progress as a percentage in `0..=100`.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(u8) + Send + Sync,
{
    fn on_progress(&self, percent: u8) {
        self(percent)
    }
}

/// Forwards server output to `tracing` under the `server` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn append_line(&self, line: &str) {
        info!(target: "server", "{}", line);
    }
}

/// Status implementation that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatus;

impl Status for LogStatus {
    fn update(&self, message: &str) {
        info!("{}", message);
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all lines received so far
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl OutputSink for MemorySink {
    fn append_line(&self, line: &str) {
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line.to_string()),
            Err(poisoned) => poisoned.into_inner().push(line.to_string()),
        }
    }
}

impl Status for MemorySink {
    fn update(&self, message: &str) {
        self.append_line(message);
    }
}
