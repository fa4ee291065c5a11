use crate::error::{Error, Result};
use crate::status::ProcessStatus;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Process id, chosen by whoever registers the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pid(String);

/// Generated worker name, `W<index>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerName(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new<S: Into<String>>(id: S) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(Pid);
string_id!(WorkerName);

/// A unit of work the pool can dispatch.
///
/// The pool never deduplicates pids: registering a pid twice replaces the
/// bookkeeping of the first registration.
pub trait Process: Send + Sync {
    /// Runs the process to completion on the calling worker thread.
    fn start(&self) -> Result<()>;

    fn name(&self) -> String;

    fn pid(&self) -> Pid;
}

/// Adapts a closure into a [`Process`].
///
/// ```
/// use procpool::process::{FnProcess, Process};
///
/// let p = FnProcess::new("p-1", "hello", || Ok(()));
/// assert_eq!(p.pid().as_str(), "p-1");
/// assert!(p.start().is_ok());
/// ```
pub struct FnProcess<F> {
    pid: Pid,
    name: String,
    func: F,
}

impl<F> FnProcess<F>
where
    F: Fn() -> Result<()> + Send + Sync,
{
    pub fn new<P: Into<Pid>, S: Into<String>>(pid: P, name: S, func: F) -> Self {
        FnProcess {
            pid: pid.into(),
            name: name.into(),
            func,
        }
    }
}

impl<F> Process for FnProcess<F>
where
    F: Fn() -> Result<()> + Send + Sync,
{
    fn start(&self) -> Result<()> {
        (self.func)()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn pid(&self) -> Pid {
        self.pid.clone()
    }
}

/// Bookkeeping for one registered process.
///
/// The zero value (`Default`) is what the monitor reports for pids it has
/// never seen.
#[derive(Clone, Default)]
pub struct ProcessStats {
    /// worker that dequeued the process, empty until dispatch
    pub worker_name: WorkerName,
    pub process: Option<Arc<dyn Process>>,
    pub status: ProcessStatus,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
    pub error: Option<Arc<Error>>,
}

impl ProcessStats {
    pub(crate) fn waiting(process: Arc<dyn Process>) -> Self {
        ProcessStats {
            process: Some(process),
            ..ProcessStats::default()
        }
    }

    /// Time between dispatch and finish, once both are known.
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.duration_since(start).ok(),
            _ => None,
        }
    }
}

impl Debug for ProcessStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessStats")
            .field("worker_name", &self.worker_name)
            .field("process", &self.process.as_ref().map(|p| p.name()))
            .field("status", &self.status)
            .field("started_at", &self.started_at)
            .field("finished_at", &self.finished_at)
            .field("error", &self.error.as_ref().map(|e| e.to_string()))
            .finish()
    }
}
