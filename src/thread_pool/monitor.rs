use super::{lock, Shared};
use crate::error::Error;
use crate::process::{Pid, ProcessStats, WorkerName};
use crate::status::{PoolStatus, WorkerStatus};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

/// Read-only view of a pool.
///
/// Unknown pids and worker names yield zero values: absence means "not yet
/// observed", not failure.
#[derive(Clone)]
pub struct Monitor {
    shared: Arc<Shared>,
}

impl Monitor {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Monitor { shared }
    }

    pub fn pool_status(&self) -> PoolStatus {
        *lock(&self.shared.status)
    }

    /// Error cached by a failed process.
    pub fn error(&self, pid: &Pid) -> Option<Arc<Error>> {
        self.shared.processes.get_or_default(pid).error
    }

    /// Worker names, empty until the pool is started.
    pub fn worker_list(&self) -> Vec<WorkerName> {
        self.shared
            .workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn worker_status(&self, name: &WorkerName) -> WorkerStatus {
        self.shared.worker_stats.get_or_default(name)
    }

    pub fn process_stats(&self, pid: &Pid) -> ProcessStats {
        self.shared.processes.get_or_default(pid)
    }

    /// Blocks until the process reaches a terminal status.
    /// Returns false on timeout or for a pid that was never registered.
    pub fn wait(&self, pid: &Pid, timeout: Duration) -> bool {
        match self.shared.controls.get(pid) {
            Some(control) => control.wait(timeout),
            None => false,
        }
    }
}
