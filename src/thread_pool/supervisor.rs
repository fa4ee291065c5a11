use super::{
    pool::{Worker, WorkerContext},
    Job, Shared, Signal,
};
use crate::process::WorkerName;
use crossbeam::channel::{Receiver, Sender};
use slog::Logger;
use std::sync::Arc;

/// It supervises workers.
///
/// Takes over the workers the pool spawned, revives any worker whose thread
/// dies, and returns from [`Supervisor::watch`] once every worker has drained
/// the queue and exited. Joining the supervisor thread is the pool's
/// completion barrier.
pub(crate) struct Supervisor {
    names: Vec<WorkerName>,
    workers: Vec<Option<Worker>>,
    receiver: Receiver<Signal>,
    sender: Sender<Signal>,
    job_receiver: Receiver<Job>,
    shared: Arc<Shared>,
    logger: Logger,
}

impl Supervisor {
    pub(crate) fn new(
        names: Vec<WorkerName>,
        workers: Vec<Worker>,
        (sender, receiver): (Sender<Signal>, Receiver<Signal>),
        job_receiver: Receiver<Job>,
        shared: Arc<Shared>,
        logger: Logger,
    ) -> Self {
        Supervisor {
            names,
            workers: workers.into_iter().map(Some).collect(),
            receiver,
            sender,
            job_receiver,
            shared,
            logger,
        }
    }

    // listen to channel
    pub fn watch(mut self) {
        let mut live = self.workers.iter().filter(|w| w.is_some()).count();
        while live > 0 {
            match self.receiver.recv() {
                Ok(Signal::Dead(slot)) => {
                    self.reap(slot);
                    // spawn a new worker in the same slot, under the same name
                    if self.revive(slot) {
                        info!(self.logger, "worker revived"; "worker" => self.names[slot].as_str());
                    } else {
                        live -= 1;
                    }
                }
                Ok(Signal::Exited(slot)) => {
                    self.reap(slot);
                    live -= 1;
                }
                // unreachable while self.sender is alive
                Err(_) => break,
            }
        }
        debug!(self.logger, "all workers exited");
    }

    fn revive(&mut self, slot: usize) -> bool {
        let context = WorkerContext::new(
            slot,
            self.names[slot].clone(),
            self.job_receiver.clone(),
            self.shared.clone(),
            self.sender.clone(),
            None,
            &self.logger,
        );
        match Worker::spawn(context) {
            Ok(worker) => {
                self.workers[slot] = Some(worker);
                true
            }
            Err(e) => {
                error!(self.logger, "unable to revive worker";
                    "worker" => self.names[slot].as_str(),
                    "error" => e.to_string()
                );
                false
            }
        }
    }

    fn reap(&mut self, slot: usize) {
        if let Some(worker) = self.workers[slot].take() {
            let name = worker.name().clone();
            if !worker.join() {
                warn!(self.logger, "worker thread died"; "worker" => name.as_str());
            }
        }
    }
}
