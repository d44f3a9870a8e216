/// Durable job status definitions
///
/// This module defines the lifecycle a job record moves through in the run store.
use std::fmt;

/// Represents the persisted status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    // ===== Active States =====
    /// Job has been created and is waiting for a worker
    Pending,

    /// Job is currently being executed by a worker
    Running,

    /// Job is parked at a checkpoint until resumed
    Paused,

    // ===== Terminal States =====
    /// Job drained its frontier or hit its page budget
    Completed,

    /// Job was stopped by an external request
    Stopped,

    /// Job aborted with a job-fatal error
    Failed,
}

impl JobStatus {
    /// Returns true if no further transitions are allowed out of this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }

    /// Returns true if a worker may still act on the job
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the status change `self -> to` is allowed
    ///
    /// Writing the current status again is always accepted and treated as a no-op.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        if *self == to {
            return true;
        }

        match self {
            Self::Pending => matches!(to, Self::Running | Self::Stopped | Self::Failed),
            Self::Running => matches!(
                to,
                Self::Paused | Self::Completed | Self::Stopped | Self::Failed
            ),
            Self::Paused => matches!(
                to,
                Self::Running | Self::Completed | Self::Stopped | Self::Failed
            ),
            Self::Completed | Self::Stopped | Self::Failed => false,
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "stopped" => Some(Self::Stopped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all() -> [Self; 6] {
        [
            Self::Pending,
            Self::Running,
            Self::Paused,
            Self::Completed,
            Self::Stopped,
            Self::Failed,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
