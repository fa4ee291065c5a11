//! A bounded worker pool that dispatches cancellable processes to a fixed
//! set of named workers and keeps per-process and per-worker status for
//! later inspection.

#[macro_use]
extern crate slog;

mod control;
pub mod error;
pub mod process;
pub mod registry;
pub mod status;
pub mod thread_pool;

pub use error::{Error, ErrorKind, Result};
pub use process::{FnProcess, Pid, Process, ProcessStats, WorkerName};
pub use status::{PoolStatus, ProcessStatus, WorkerStatus};
pub use thread_pool::{Config, Monitor, ProcessPool, WorkerPool};
