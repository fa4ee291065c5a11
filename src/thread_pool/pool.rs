use super::{lock, supervisor::Supervisor, Job, Monitor, ProcessPool, Shared, Signal};
use crate::control::ProcessControl;
use crate::error::{Error, ErrorKind, Result};
use crate::process::{Pid, Process, ProcessStats, WorkerName};
use crate::status::{PoolStatus, ProcessStatus, WorkerStatus};
use crossbeam::channel::{bounded, unbounded, Receiver, SendTimeoutError, Sender};
use crossbeam::sync::WaitGroup;
use slog::{Discard, Logger};
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

const WORKER_NAME_PREFIX: &str = "W";
// a publisher facing a full queue holds the intake lock at most this long per
// attempt and keeps re-polling; close and drop take the lock in between
const PUBLISH_RETRY: Duration = Duration::from_millis(50);

type Intake = Arc<Mutex<Option<Sender<Job>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// number of workers
    pub size: usize,
    /// queue bound, defaults to `size`
    pub queue_capacity: Option<usize>,
}

impl Config {
    pub fn new(size: usize) -> Self {
        Config {
            size,
            queue_capacity: None,
        }
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }
}

/// Bounded pool of named workers.
///
/// # Example
///
/// ```
/// use procpool::{FnProcess, Pid, Process, ProcessPool, ProcessStatus, WorkerPool};
/// use std::sync::Arc;
///
/// let pool = WorkerPool::new(2).unwrap();
/// pool.start().unwrap();
/// let job: Arc<dyn Process> = Arc::new(FnProcess::new("p-1", "noop", || Ok(())));
/// pool.register(vec![job]);
/// pool.close().unwrap();
///
/// let stats = pool.monitor().process_stats(&Pid::from("p-1"));
/// assert_eq!(stats.status, ProcessStatus::Succeeded);
/// ```
pub struct WorkerPool {
    size: usize,
    shared: Arc<Shared>,
    // `None` once the pool is closed; publishers check it before every send
    intake: Intake,
    receiver: Receiver<Job>,
    // one clone per publisher thread still feeding the queue
    publishers: Mutex<WaitGroup>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    logger: Logger,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self> {
        Self::with_logger(size, Logger::root(Discard, o!()))
    }

    pub fn with_logger(size: usize, logger: Logger) -> Result<Self> {
        Self::with_config(Config::new(size), logger)
    }

    pub fn with_config(config: Config, logger: Logger) -> Result<Self> {
        let capacity = config.queue_capacity.unwrap_or(config.size);
        if config.size == 0 {
            return Err(Error::from(ErrorKind::InvalidSize(config.size)));
        }
        if capacity == 0 {
            return Err(Error::from(ErrorKind::InvalidSize(capacity)));
        }

        let (sender, receiver) = bounded::<Job>(capacity);
        Ok(WorkerPool {
            size: config.size,
            shared: Arc::new(Shared::default()),
            intake: Arc::new(Mutex::new(Some(sender))),
            receiver,
            publishers: Mutex::new(WaitGroup::new()),
            supervisor: Mutex::new(None),
            logger,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    // every worker is spawned before the pool reports Running; a failed spawn
    // releases the ones already up without letting them touch the queue
    fn launch<F>(&self, mut spawn: F) -> Result<()>
    where
        F: FnMut(WorkerContext) -> Result<Worker>,
    {
        let mut status = lock(&self.shared.status);
        match *status {
            PoolStatus::Running => return Err(Error::from(ErrorKind::AlreadyRunning(*status))),
            PoolStatus::Closed => return Err(Error::from(ErrorKind::Closed)),
            PoolStatus::Created => {}
        }

        let names: Vec<WorkerName> = (0..self.size)
            .map(|i| WorkerName::new(format!("{}{}", WORKER_NAME_PREFIX, i)))
            .collect();
        let (notifier, signals) = unbounded::<Signal>();
        // capacity covers one verdict per worker, so sends never block
        let (verdict, gate) = bounded::<bool>(self.size);

        let mut workers = Vec::with_capacity(self.size);
        for (slot, name) in names.iter().enumerate() {
            let context = WorkerContext::new(
                slot,
                name.clone(),
                self.receiver.clone(),
                self.shared.clone(),
                notifier.clone(),
                Some(gate.clone()),
                &self.logger,
            );
            match spawn(context) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    error!(self.logger, "unable to spawn worker"; "worker" => name.as_str(), "error" => e.to_string());
                    for _ in &workers {
                        let _ = verdict.send(false);
                    }
                    for worker in workers {
                        worker.join();
                    }
                    return Err(e);
                }
            }
        }

        let supervisor = Supervisor::new(
            names.clone(),
            workers,
            (notifier, signals),
            self.receiver.clone(),
            self.shared.clone(),
            self.logger.clone(),
        );
        let spawned = thread::Builder::new()
            .name("supervisor".to_owned())
            .spawn(move || supervisor.watch());
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                // worker handles were dropped with the closure, dismiss the detached threads
                for _ in 0..self.size {
                    let _ = verdict.send(false);
                }
                return Err(Error::from(e));
            }
        };

        for name in &names {
            self.shared.worker_stats.put(name.clone(), WorkerStatus::Waiting);
        }
        *self
            .shared
            .workers
            .write()
            .unwrap_or_else(PoisonError::into_inner) = names;
        *lock(&self.supervisor) = Some(handle);
        for _ in 0..self.size {
            let _ = verdict.send(true);
        }

        *status = PoolStatus::Running;
        info!(self.logger, "pool started"; "size" => self.size);
        Ok(())
    }
}

impl ProcessPool for WorkerPool {
    fn start(&self) -> Result<()> {
        self.launch(Worker::spawn)
    }

    fn register<I>(&self, processes: I)
    where
        I: IntoIterator<Item = Arc<dyn Process>>,
    {
        // bookkeeping must exist before the caller can kill or a worker can look up
        let jobs: Vec<Job> = processes
            .into_iter()
            .map(|process| {
                let pid = process.pid();
                self.shared
                    .controls
                    .put(pid.clone(), Arc::new(ProcessControl::new()));
                self.shared
                    .processes
                    .put(pid.clone(), ProcessStats::waiting(process.clone()));
                Job { pid, process }
            })
            .collect();
        if jobs.is_empty() {
            return;
        }

        debug!(self.logger, "processes registered"; "count" => jobs.len());
        let intake = self.intake.clone();
        let logger = self.logger.clone();
        let pending = lock(&self.publishers).clone();
        let spawned = thread::Builder::new()
            .name("publisher".to_owned())
            .spawn(move || {
                publish(intake, jobs, logger);
                drop(pending);
            });
        if let Err(e) = spawned {
            error!(self.logger, "unable to spawn publisher, processes stay waiting"; "error" => e.to_string());
        }
    }

    fn kill(&self, pid: &Pid) {
        match self.shared.controls.get(pid) {
            Some(control) => {
                if control.cancel() {
                    debug!(self.logger, "kill requested"; "pid" => pid.as_str());
                }
            }
            None => warn!(self.logger, "kill requested for unknown process"; "pid" => pid.as_str()),
        }
    }

    fn close(&self) -> Result<()> {
        let supervisor = {
            let status = lock(&self.shared.status);
            if *status != PoolStatus::Running {
                return Err(Error::from(ErrorKind::NotRunning(*status)));
            }
            // a concurrent close already took the handle
            match lock(&self.supervisor).take() {
                Some(handle) => handle,
                None => return Err(Error::from(ErrorKind::NotRunning(*status))),
            }
        };

        // registrations that returned before close still get queued,
        // later ones are cut off by the closed intake
        let pending = mem::replace(&mut *lock(&self.publishers), WaitGroup::new());
        pending.wait();

        // dropping the only sender under the intake lock closes the queue
        lock(&self.intake).take();
        info!(self.logger, "pool closing, draining queue");

        let joined = supervisor.join();
        *lock(&self.shared.status) = PoolStatus::Closed;
        joined.map_err(|_| Error::from(ErrorKind::Supervisor))?;

        info!(self.logger, "pool closed");
        Ok(())
    }

    fn monitor(&self) -> Monitor {
        Monitor::new(self.shared.clone())
    }
}

// stop intake when pool is dropped, workers finish what is queued
impl Drop for WorkerPool {
    fn drop(&mut self) {
        if lock(&self.intake).take().is_some() {
            debug!(self.logger, "pool dropped without close");
        }
    }
}

// feed the queue in registration order until done or the pool closes
fn publish(intake: Intake, jobs: Vec<Job>, logger: Logger) {
    let total = jobs.len();
    for (sent, mut job) in jobs.into_iter().enumerate() {
        loop {
            let guard = lock(&intake);
            let sender = match guard.as_ref() {
                Some(sender) => sender,
                None => {
                    warn!(logger, "pool is closed, processes will not be dispatched"; "dropped" => total - sent);
                    return;
                }
            };
            match sender.send_timeout(job, PUBLISH_RETRY) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(back)) => {
                    job = back;
                    drop(guard);
                    thread::yield_now();
                }
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }
}

/// One worker thread, owned by the supervisor.
pub(crate) struct Worker {
    name: WorkerName,
    thread: JoinHandle<()>,
}

impl Worker {
    pub fn spawn(context: WorkerContext) -> Result<Worker> {
        let name = context.name.clone();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || do_job(context))?;
        Ok(Worker { name, thread })
    }

    pub fn name(&self) -> &WorkerName {
        &self.name
    }

    /// Returns false if the worker thread panicked.
    pub fn join(self) -> bool {
        self.thread.join().is_ok()
    }
}

/// Everything a worker thread needs. A fresh one is built for every spawn,
/// including revivals under the same name.
pub(crate) struct WorkerContext {
    slot: usize,
    name: WorkerName,
    receiver: Receiver<Job>,
    shared: Arc<Shared>,
    // notify Supervisor
    notifier: Sender<Signal>,
    // initial workers hold here until start settles, revived ones pass None
    gate: Option<Receiver<bool>>,
    logger: Logger,
}

impl WorkerContext {
    pub(crate) fn new(
        slot: usize,
        name: WorkerName,
        receiver: Receiver<Job>,
        shared: Arc<Shared>,
        notifier: Sender<Signal>,
        gate: Option<Receiver<bool>>,
        logger: &Logger,
    ) -> Self {
        let logger = logger.new(o!("worker" => name.to_string()));
        WorkerContext {
            slot,
            name,
            receiver,
            shared,
            notifier,
            gate,
            logger,
        }
    }
}

// tracks the in-flight process so a panic can still settle it
struct WorkerGuard<'a> {
    context: &'a WorkerContext,
    current: Option<Pid>,
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        let context = self.context;
        let signal = if thread::panicking() {
            if let Some(pid) = self.current.take() {
                error!(context.logger, "process panicked"; "pid" => pid.as_str());
                let err = Error::from(ErrorKind::Panicked(context.name.clone()));
                finish(context, &pid, ProcessStatus::Failed, Some(Arc::new(err)));
            }
            Signal::Dead(context.slot)
        } else {
            Signal::Exited(context.slot)
        };

        if context.notifier.send(signal).is_err() {
            error!(context.logger, "unable to notify supervisor");
        }
    }
}

// consume the queue until it is closed and drained
fn do_job(context: WorkerContext) {
    if let Some(gate) = &context.gate {
        if !gate.recv().unwrap_or(false) {
            debug!(context.logger, "worker dismissed before start");
            return;
        }
    }
    let mut guard = WorkerGuard {
        context: &context,
        current: None,
    };
    for job in context.receiver.iter() {
        guard.current = Some(job.pid.clone());
        run(&context, job);
        guard.current = None;
    }
}

fn run(context: &WorkerContext, job: Job) {
    let shared = &context.shared;
    shared
        .worker_stats
        .put(context.name.clone(), WorkerStatus::Busy);
    shared.processes.update(&job.pid, |stats| {
        stats.status = ProcessStatus::Running;
        stats.started_at = Some(SystemTime::now());
        stats.worker_name = context.name.clone();
    });

    // last chance to honor a kill, nothing is preempted after this point
    let killed = shared
        .controls
        .get(&job.pid)
        .map_or(false, |control| control.is_cancelled());
    if killed {
        warn!(context.logger, "process has been killed"; "pid" => job.pid.as_str());
        finish(context, &job.pid, ProcessStatus::Killed, None);
        return;
    }

    debug!(context.logger, "process started"; "pid" => job.pid.as_str(), "name" => job.process.name());
    match job.process.start() {
        Ok(()) => {
            debug!(context.logger, "process succeeded"; "pid" => job.pid.as_str());
            finish(context, &job.pid, ProcessStatus::Succeeded, None);
        }
        Err(e) => {
            debug!(context.logger, "process failed"; "pid" => job.pid.as_str(), "error" => e.to_string());
            finish(context, &job.pid, ProcessStatus::Failed, Some(Arc::new(e)));
        }
    }
}

// stats are final before the completion event fires
fn finish(context: &WorkerContext, pid: &Pid, status: ProcessStatus, error: Option<Arc<Error>>) {
    let shared = &context.shared;
    shared.processes.update(pid, |stats| {
        stats.status = status;
        stats.error = error;
        stats.finished_at = Some(SystemTime::now());
    });
    if let Some(control) = shared.controls.get(pid) {
        control.complete();
    }
    shared
        .worker_stats
        .put(context.name.clone(), WorkerStatus::Waiting);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::FnProcess;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter(pid: &str, runs: &Arc<AtomicUsize>) -> Arc<dyn Process> {
        let runs = runs.clone();
        Arc::new(FnProcess::new(pid, "counter", move || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }

    #[test]
    fn start_spawns_one_worker_per_slot() {
        let pool = WorkerPool::new(3).unwrap();
        let mut spawned = Vec::new();
        pool.launch(|context| {
            spawned.push(context.name.clone());
            Worker::spawn(context)
        })
        .unwrap();
        assert_eq!(
            spawned,
            vec![WorkerName::from("W0"), WorkerName::from("W1"), WorkerName::from("W2")]
        );
        assert_eq!(pool.monitor().worker_list(), spawned);
        pool.close().unwrap();
    }

    #[test]
    fn failed_worker_spawn_aborts_start() {
        let pool = WorkerPool::new(3).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        pool.register(vec![counter("p-1", &runs)]);

        let mut calls = 0;
        let err = pool
            .launch(|context| {
                calls += 1;
                if calls == 2 {
                    return Err(Error::from(io::Error::new(
                        io::ErrorKind::Other,
                        "thread limit reached",
                    )));
                }
                Worker::spawn(context)
            })
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::IO(_)));

        let monitor = pool.monitor();
        assert_eq!(monitor.pool_status(), PoolStatus::Created);
        assert!(monitor.worker_list().is_empty());
        assert!(matches!(pool.close().unwrap_err().kind(), ErrorKind::NotRunning(_)));

        // the worker spawned before the failure was dismissed without dequeuing
        thread::sleep(Duration::from_millis(50));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(
            monitor.process_stats(&Pid::from("p-1")).status,
            ProcessStatus::Waiting
        );

        pool.start().unwrap();
        pool.close().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(
            monitor.process_stats(&Pid::from("p-1")).status,
            ProcessStatus::Succeeded
        );
    }
}
