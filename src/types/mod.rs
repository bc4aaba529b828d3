//! Shared types: error taxonomy and the collaborator-facing sinks

mod errors;
mod sinks;

pub use errors::{Error, LaunchError, Result, UpdateError};
pub use sinks::{LogStatus, MemorySink, OutputSink, ProgressSink, Status, TracingSink};
