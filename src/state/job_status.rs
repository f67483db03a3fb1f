/// Job status definitions for tracking run progress
///
/// This module defines every state a job can be in and the transitions between them.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job was submitted and has never run
    #[default]
    Idle,

    /// A run is in progress
    Running,

    // ===== Terminal States =====
    /// Last run finished its traversal
    Completed,

    /// Last run could not fetch or parse the seed page
    Failed,

    /// Last run was cancelled by an explicit stop
    Stopped,
}

impl JobStatus {
    /// Returns true if this is a terminal state of a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Returns true if a new run may start from this state
    pub fn can_start(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Checks whether moving from `self` to `to` is a legal transition
    ///
    /// Only `idle -> running`, `running -> {completed, failed, stopped}` and a
    /// fresh start from a terminal state are allowed.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        match (self, to) {
            (Self::Running, Self::Completed | Self::Failed | Self::Stopped) => true,
            (from, Self::Running) => from.can_start(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Parses a status from its string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
