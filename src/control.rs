use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Per-process control handle.
///
/// Carries two independent one-shot signals: a kill request, polled by the
/// worker right before the process would start, and a completion event fired
/// once the process reaches a terminal status. A completed process was not
/// necessarily killed.
#[derive(Debug)]
pub struct ProcessControl {
    cancelled: AtomicBool,
    // dropping the sender closes `done`, which every waiter observes
    done_sender: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

impl ProcessControl {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(0);
        ProcessControl {
            cancelled: AtomicBool::new(false),
            done_sender: Mutex::new(Some(sender)),
            done: receiver,
        }
    }

    /// Requests a kill. Returns true only for the call that set the flag.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fires the completion event. Later calls are no-ops.
    pub fn complete(&self) {
        self.done_sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Blocks until completion or until `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            // nothing is ever sent, so any other outcome means disconnected
            _ => true,
        }
    }
}
