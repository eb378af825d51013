//! Probe failure taxonomy.
//!
//! Every variant is recoverable: a failed candidate hands the next one its
//! turn, and an exhausted data source turns the last failure into a note on
//! an `unavailable` entry. Nothing here is propagated past a data source.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("{0} not found on this host")]
    ToolAbsent(String),

    #[error("exited with status {0}")]
    NonZeroExit(i32),

    #[error("killed by signal")]
    Signaled,

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("failed to spawn: {0}")]
    Spawn(String),

    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("produced no output")]
    EmptyOutput,

    #[error("needs elevated privileges")]
    ElevationUnavailable,

    #[error("run deadline exceeded")]
    DeadlineExceeded,

    #[error("probe task aborted")]
    Aborted,
}

impl ProbeError {
    /// Whether the candidate actually ran and failed, as opposed to being
    /// skipped before invocation.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            ProbeError::NonZeroExit(_)
                | ProbeError::Signaled
                | ProbeError::TimedOut(_)
                | ProbeError::Spawn(_)
                | ProbeError::Read { .. }
        )
    }
}
