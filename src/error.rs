//! Error taxonomy for scan runs.
//!
//! Only faults that abort a run before any task is scheduled surface as
//! errors. An empty resolved target set is a normal outcome
//! ([`RunOutcome::NoTargets`](crate::report::RunOutcome::NoTargets)), and
//! failures inside a single host's scan stay inside the probing engine;
//! the orchestrator observes task completion, never task-level errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A fault that is fatal to the entire run.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Malformed IP-range or port-range specification. Raised during
    /// configuration construction or target expansion, always before any
    /// task has been scheduled.
    #[error("invalid scan specification: {0}")]
    Parse(String),

    /// A `user-list`/`pass-list` value was classified as a file path but the
    /// file could not be read.
    #[error("wordlist {path:?} could not be read")]
    Wordlist {
        /// Path the value was classified as.
        path: PathBuf,
        /// Underlying read failure.
        #[source]
        source: io::Error,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ScanError>;
