use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Lifecycle of a pool. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolStatus {
    Created,
    Running,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessStatus {
    Waiting,
    Running,
    Succeeded,
    Failed,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    Waiting,
    Busy,
}

impl ProcessStatus {
    /// succeeded, failed and killed processes never change again
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessStatus::Succeeded | ProcessStatus::Failed | ProcessStatus::Killed
        )
    }
}

impl Default for PoolStatus {
    fn default() -> Self {
        PoolStatus::Created
    }
}

impl Default for ProcessStatus {
    fn default() -> Self {
        ProcessStatus::Waiting
    }
}

impl Default for WorkerStatus {
    fn default() -> Self {
        WorkerStatus::Waiting
    }
}

impl Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PoolStatus::Created => "Created",
            PoolStatus::Running => "Running",
            PoolStatus::Closed => "Closed",
        };
        f.write_str(s)
    }
}

impl Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::Waiting => "Waiting",
            ProcessStatus::Running => "Running",
            ProcessStatus::Succeeded => "Succeeded",
            ProcessStatus::Failed => "Failed",
            ProcessStatus::Killed => "Killed",
        };
        f.write_str(s)
    }
}

impl Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::Waiting => "Waiting",
            WorkerStatus::Busy => "Busy",
        };
        f.write_str(s)
    }
}
