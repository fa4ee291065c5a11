use crate::control::ProcessControl;
use crate::error::Result;
use crate::process::{Pid, Process, ProcessStats, WorkerName};
use crate::registry::Registry;
use crate::status::{PoolStatus, WorkerStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

mod monitor;
mod pool;
mod supervisor;
pub use monitor::Monitor;
pub use pool::{Config, WorkerPool};

/// Dispatches registered processes over a fixed set of workers.
pub trait ProcessPool {
    /// Spawns the workers. Rejected while running or once closed.
    fn start(&self) -> Result<()>;

    /// Records every process as waiting, then queues them in the background
    /// so a full queue never blocks the caller.
    fn register<I>(&self, processes: I)
    where
        I: IntoIterator<Item = Arc<dyn Process>>;

    /// Best-effort kill: only honored if no worker has started the process yet.
    fn kill(&self, pid: &Pid);

    /// Stops intake and blocks until workers drain the queue.
    fn close(&self) -> Result<()>;

    fn monitor(&self) -> Monitor;
}

pub(crate) struct Job {
    pid: Pid,
    process: Arc<dyn Process>,
}

/// worker lifecycle events sent to the supervisor, carrying the worker slot
pub(crate) enum Signal {
    Dead(usize),
    Exited(usize),
}

/// State shared by the pool, its workers and every monitor.
#[derive(Default)]
pub(crate) struct Shared {
    status: Mutex<PoolStatus>,
    workers: RwLock<Vec<WorkerName>>,
    controls: Registry<Pid, Arc<ProcessControl>>,
    worker_stats: Registry<WorkerName, WorkerStatus>,
    processes: Registry<Pid, ProcessStats>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
