use super::{Escalation, Job};
use crate::signal::Signal;
use crossbeam::channel::{Receiver, Sender, TrySendError};
use crossbeam::select;
use slog::{debug, error, info, o, warn, Logger};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Everything a worker thread shares with its pool.
pub(crate) struct WorkerContext {
    pub queue: Receiver<Job>,
    pub cancel: Signal,
    pub escalations: Sender<Escalation>,
    pub error_count: Arc<AtomicU64>,
    pub backoff_unit: Duration,
    pub logger: Logger,
    // dropped when the thread ends, even by panic; the pool waits for all
    // of these to disconnect during shutdown
    pub _exit: Sender<()>,
}

pub(crate) struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(id: usize, context: WorkerContext) -> io::Result<Worker> {
        let logger = context.logger.new(o!("worker" => id));
        let context = WorkerContext { logger, ..context };
        let thread = thread::Builder::new()
            .name(format!("telemetry-worker-{}", id))
            .spawn(move || context.run(id))?;

        Ok(Worker {
            id,
            thread: Some(thread),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Join the thread. Only call once it is known to have exited.
    pub fn join(mut self) -> bool {
        match self.thread.take() {
            Some(thread) => thread.join().is_ok(),
            None => true,
        }
    }
}

impl WorkerContext {
    fn run(self, id: usize) {
        loop {
            select! {
                recv(self.cancel.receiver()) -> _ => break,
                recv(self.queue) -> message => match message {
                    Ok(job) => {
                        // cancellation may race with a ready queue
                        if self.cancel.is_fired() {
                            debug!(self.logger, "dropping job dequeued after cancellation"; "job" => job.name());
                            break;
                        }
                        self.execute(job);
                    }
                    Err(_) => break,
                },
            }
        }
        debug!(self.logger, "worker {} shutting down", id);
    }

    fn execute(&self, job: Job) {
        let logger = self.logger.new(o!("job" => job.name().to_owned()));
        let attempts = u64::from(job.retry_budget()) + 1;
        let mut attempt: u32 = 0;

        loop {
            debug!(logger, "attempting job"; "attempt" => attempt + 1, "of" => attempts);

            let err = match job.run(&self.cancel) {
                Ok(()) => {
                    debug!(logger, "job completed");
                    return;
                }
                Err(err) => err,
            };
            warn!(logger, "job failed: {}", err; "attempt" => attempt + 1, "of" => attempts);
            if !job.report(&err) {
                warn!(logger, "error callback panicked");
            }

            if job.is_critical() {
                error!(logger, "critical job failed, escalating");
                self.escalate(&logger, job.name(), err);
                return;
            }

            attempt += 1;
            if attempt > job.retry_budget() {
                break;
            }

            let backoff = self.backoff_unit * attempt;
            debug!(logger, "backing off before retry"; "backoff_ms" => backoff.as_millis() as u64);
            if self.cancel.wait_timeout(backoff) {
                info!(logger, "pool cancelled during backoff, abandoning job");
                return;
            }
        }

        let total = self.error_count.fetch_add(1, Ordering::SeqCst) + 1;
        error!(logger, "job exhausted its retries"; "attempts" => attempts, "error_count" => total);
    }

    fn escalate(&self, logger: &Logger, job: &str, error: failure::Error) {
        let escalation = Escalation {
            job: job.to_owned(),
            error,
        };
        match self.escalations.try_send(escalation) {
            Ok(()) => {}
            Err(TrySendError::Full(escalation)) => {
                warn!(logger, "escalation slot taken, shutdown already pending: {}", escalation.error)
            }
            Err(TrySendError::Disconnected(escalation)) => {
                warn!(logger, "error monitor gone, dropping escalation: {}", escalation.error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging;
    use crossbeam::channel::{bounded, unbounded};
    use std::sync::atomic::AtomicUsize;

    struct Harness {
        context: WorkerContext,
        escalations: Receiver<Escalation>,
    }

    fn harness(backoff_unit: Duration) -> Harness {
        let (_queue_tx, queue) = unbounded();
        let (escalate_tx, escalations) = bounded(1);
        let (exit, _exit_rx) = bounded(0);
        Harness {
            context: WorkerContext {
                queue,
                cancel: Signal::new(),
                escalations: escalate_tx,
                error_count: Arc::new(AtomicU64::new(0)),
                backoff_unit,
                logger: logging::discard(),
                _exit: exit,
            },
            escalations,
        }
    }

    fn failing(name: &str, calls: &Arc<AtomicUsize>) -> Job {
        let calls = calls.clone();
        Job::new(name, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(failure::err_msg("no route to broker"))
        })
    }

    #[test]
    fn exhausted_job_counts_once() {
        let harness = harness(Duration::from_millis(1));
        let calls = Arc::new(AtomicUsize::new(0));

        harness.context.execute(failing("publish", &calls).retries(2));

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(harness.context.error_count.load(Ordering::SeqCst), 1);
        assert!(harness.escalations.try_recv().is_err());
    }

    #[test]
    fn succeeds_after_retry() {
        let harness = harness(Duration::from_millis(1));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let job = Job::new("connect", move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 1 {
                Err(failure::err_msg("refused"))
            } else {
                Ok(())
            }
        })
        .retries(5);

        harness.context.execute(job);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(harness.context.error_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn critical_job_escalates_without_retry() {
        let harness = harness(Duration::from_millis(1));
        let calls = Arc::new(AtomicUsize::new(0));

        harness
            .context
            .execute(failing("subscribe", &calls).retries(3).critical(true));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.context.error_count.load(Ordering::SeqCst), 0);
        let escalation = harness.escalations.try_recv().unwrap();
        assert_eq!(escalation.job, "subscribe");
        assert_eq!(escalation.error.to_string(), "no route to broker");
    }

    #[test]
    fn second_escalation_is_dropped() {
        let harness = harness(Duration::from_millis(1));
        let calls = Arc::new(AtomicUsize::new(0));

        harness.context.execute(failing("first", &calls).critical(true));
        harness.context.execute(failing("second", &calls).critical(true));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(harness.escalations.try_recv().unwrap().job, "first");
        assert!(harness.escalations.try_recv().is_err());
    }

    #[test]
    fn cancelled_backoff_abandons_job() {
        let harness = harness(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        harness.context.cancel.fire();

        harness.context.execute(failing("publish", &calls).retries(3));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.context.error_count.load(Ordering::SeqCst), 0);
    }
}
