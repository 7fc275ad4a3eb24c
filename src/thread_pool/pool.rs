use super::supervisor::Supervisor;
use super::worker::{Worker, WorkerContext};
use super::{Escalation, Job};
use crate::common::{lock, Lifecycle};
use crate::config::PoolConfig;
use crate::error::{ErrorKind, Result};
use crate::logging;
use crate::signal::Signal;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use crossbeam::select;
use slog::{debug, info, o, warn, Level, Logger};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

/// A fixed-size pool of worker threads fed by a bounded FIFO queue.
///
/// Jobs are fire-and-forget: failures show up in the log and in
/// [`error_count`](WorkerPool::error_count), never at the submitter. A
/// critical job that fails shuts the whole pool down.
///
/// ```
/// use telemetry::config::PoolConfig;
/// use telemetry::logging;
/// use telemetry::thread_pool::{Job, WorkerPool};
///
/// let pool = WorkerPool::with_config(PoolConfig::new(2), logging::discard()).unwrap();
/// pool.start().unwrap();
/// pool.submit(Job::new("noop", |_| Ok(())));
/// pool.shutdown();
/// assert!(pool.done().is_fired());
/// ```
pub struct WorkerPool {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    config: PoolConfig,
    logger: Logger,
    // None once the queue is closed
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    escalations: (Sender<Escalation>, Receiver<Escalation>),
    cancel: Signal,
    done: Signal,
    state: Mutex<Lifecycle>,
    error_count: Arc<AtomicU64>,
    workers: Mutex<Vec<Worker>>,
    // disconnects once every worker thread has ended
    exits: Mutex<Option<Receiver<()>>>,
    pub(crate) critical: Mutex<Option<String>>,
}

impl WorkerPool {
    /// A pool of `workers` threads with default settings, logging to the terminal.
    pub fn new(workers: usize) -> Result<Self> {
        WorkerPool::with_config(PoolConfig::new(workers), logging::terminal(Level::Info))
    }

    pub fn with_config(config: PoolConfig, logger: Logger) -> Result<Self> {
        config.validate()?;
        let (sender, receiver) = bounded(config.queue_capacity());
        let logger = logger.new(o!("component" => "worker-pool"));

        Ok(WorkerPool {
            shared: Arc::new(Shared {
                config,
                logger,
                sender: Mutex::new(Some(sender)),
                receiver,
                escalations: bounded(1),
                cancel: Signal::new(),
                done: Signal::new(),
                state: Mutex::new(Lifecycle::Created),
                error_count: Arc::new(AtomicU64::new(0)),
                workers: Mutex::new(Vec::new()),
                exits: Mutex::new(None),
                critical: Mutex::new(None),
            }),
        })
    }

    /// Spawn the worker threads and the supervisor. Fails if called twice.
    pub fn start(&self) -> Result<()> {
        let shared = &self.shared;
        let mut state = lock(&shared.state);
        if *state != Lifecycle::Created {
            return Err(ErrorKind::AlreadyStarted.into());
        }
        info!(shared.logger, "starting worker pool with {} workers", shared.config.workers);

        let (exit, exits) = bounded::<()>(0);
        let mut workers = Vec::with_capacity(shared.config.workers);
        for id in 0..shared.config.workers {
            let context = WorkerContext {
                queue: shared.receiver.clone(),
                cancel: shared.cancel.clone(),
                escalations: shared.escalations.0.clone(),
                error_count: shared.error_count.clone(),
                backoff_unit: shared.config.backoff_unit(),
                logger: shared.logger.clone(),
                _exit: exit.clone(),
            };
            match Worker::spawn(id, context) {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    // stop whatever did spawn before reporting
                    shared.cancel.fire();
                    *state = Lifecycle::Stopped;
                    shared.done.fire();
                    return Err(err.into());
                }
            }
        }
        // only the workers' clones remain
        drop(exit);

        let supervisor = Supervisor::new(
            shared.escalations.1.clone(),
            shared.cancel.clone(),
            Arc::downgrade(shared),
            shared.logger.new(o!("component" => "supervisor")),
        );
        if let Err(err) = thread::Builder::new()
            .name("telemetry-supervisor".to_string())
            .spawn(move || supervisor.watch())
        {
            shared.cancel.fire();
            *state = Lifecycle::Stopped;
            shared.done.fire();
            return Err(err.into());
        }

        *lock(&shared.workers) = workers;
        *lock(&shared.exits) = Some(exits);
        *state = Lifecycle::Running;
        Ok(())
    }

    /// Queue a job. Blocks while the queue is full; drops the job if the pool
    /// is shutting down.
    ///
    /// Before `start` nothing drains the queue, so a job that does not fit is
    /// dropped instead of blocking.
    pub fn submit(&self, job: Job) {
        self.shared.submit(job)
    }

    /// Cancel every worker and wait for them, bounded by the grace deadline.
    /// Concurrent callers block until the first one has finished.
    ///
    /// A job that ignores cancellation past the deadline keeps its thread:
    /// the worker is detached, not killed, and runs until the job returns.
    ///
    /// Job bodies must not call this, nor drop the last handle to the pool:
    /// the calling worker would wait for its own exit until the deadline.
    pub fn shutdown(&self) {
        self.shared.shutdown()
    }

    /// Cancellation handle shared with every running job.
    pub fn context(&self) -> Signal {
        self.shared.cancel.clone()
    }

    /// Fires once shutdown has closed the pool's resources.
    pub fn done(&self) -> Signal {
        self.shared.done.clone()
    }

    /// Number of non-critical jobs that exhausted their retries.
    pub fn error_count(&self) -> u64 {
        self.shared.error_count.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> Lifecycle {
        *lock(&self.shared.state)
    }

    pub fn workers(&self) -> usize {
        self.shared.config.workers
    }

    /// The critical failure that shut the pool down, if any.
    pub fn last_critical(&self) -> Option<String> {
        lock(&self.shared.critical).clone()
    }
}

// shut down threads when pool is dropped
impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl Shared {
    fn submit(&self, job: Job) {
        if self.cancel.is_fired() {
            warn!(self.logger, "cannot submit job, worker pool is shutting down"; "job" => job.name());
            return;
        }
        let sender = match lock(&self.sender).clone() {
            Some(sender) => sender,
            None => {
                warn!(self.logger, "cannot submit job, worker pool is stopped"; "job" => job.name());
                return;
            }
        };

        {
            let state = lock(&self.state);
            if *state == Lifecycle::Created {
                match sender.try_send(job) {
                    Ok(()) => debug!(self.logger, "queued job before start"),
                    Err(err) => {
                        let job = err.into_inner();
                        warn!(self.logger, "cannot submit job, queue full before start"; "job" => job.name());
                    }
                }
                return;
            }
        }

        let name = job.name().to_owned();
        select! {
            send(sender, job) -> res => match res {
                Ok(()) => debug!(self.logger, "submitted job"; "job" => &name),
                Err(_) => warn!(self.logger, "cannot submit job, queue closed"; "job" => &name),
            },
            recv(self.cancel.receiver()) -> _ => {
                warn!(self.logger, "cannot submit job, worker pool is shutting down"; "job" => &name);
            }
        }
    }

    pub(crate) fn shutdown(&self) {
        {
            let mut state = lock(&self.state);
            if state.is_closing() {
                drop(state);
                // another caller owns the shutdown
                self.done.wait();
                return;
            }
            *state = Lifecycle::ShuttingDown;
        }
        self.cancel.fire();

        let deadline = Instant::now() + self.config.shutdown_timeout();
        let graceful = match lock(&self.exits).take() {
            Some(exits) => wait_for_exits(&exits, deadline),
            None => true,
        };
        let workers = mem::take(&mut *lock(&self.workers));
        if graceful {
            for worker in workers {
                let id = worker.id();
                if !worker.join() {
                    warn!(self.logger, "worker {} panicked", id);
                }
            }
            info!(self.logger, "worker pool shut down gracefully");
        } else {
            // stragglers keep running detached until their job returns
            warn!(self.logger, "worker pool shutdown timed out";
                "timeout_ms" => self.config.shutdown_timeout_ms,
                "workers" => workers.len());
        }

        // close the queue
        lock(&self.sender).take();
        let discarded = self.receiver.try_iter().count();
        if discarded > 0 {
            warn!(self.logger, "discarded {} queued jobs", discarded);
        }

        *lock(&self.state) = Lifecycle::Stopped;
        self.done.fire();
    }
}

// true if every worker ended before the deadline
fn wait_for_exits(exits: &Receiver<()>, deadline: Instant) -> bool {
    loop {
        match exits.recv_deadline(deadline) {
            Ok(()) => continue,
            Err(RecvTimeoutError::Disconnected) => return true,
            Err(RecvTimeoutError::Timeout) => return false,
        }
    }
}
