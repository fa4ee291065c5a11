use crate::process::WorkerName;
use crate::status::PoolStatus;
use failure::{Context, Fail};
use std::fmt::Display;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}
#[derive(Debug, Fail)]
pub enum ErrorKind {
    #[fail(display = "unable to start the pool, status: {}", _0)]
    AlreadyRunning(PoolStatus),

    #[fail(display = "pool is not running, status: {}", _0)]
    NotRunning(PoolStatus),

    #[fail(display = "pool is closed and cannot be started again")]
    Closed,

    #[fail(display = "pool size and queue capacity must be positive, got {}", _0)]
    InvalidSize(usize),

    #[fail(display = "{}", _0)]
    Process(String),

    #[fail(display = "process panicked on worker {}", _0)]
    Panicked(WorkerName),

    #[fail(display = "supervisor thread died before all workers exited")]
    Supervisor,

    #[fail(display = "{}", _0)]
    IO(#[cause] io::Error),

    #[fail(display = "{}", _0)]
    Serde(#[cause] serde_json::Error),
}

impl Error {
    /// failure reported by a process's start operation
    pub fn process<S: Into<String>>(msg: S) -> Self {
        Error::from(ErrorKind::Process(msg.into()))
    }

    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error {
            inner: Context::new(ErrorKind::IO(err)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            inner: Context::new(ErrorKind::Serde(err)),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(err: ErrorKind) -> Self {
        Error {
            inner: Context::new(err),
        }
    }
}
