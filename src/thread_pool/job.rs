use crate::signal::Signal;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Outcome of a single attempt at a job.
pub type JobResult = std::result::Result<(), failure::Error>;

type Execute = Box<dyn Fn(&Signal) -> JobResult + Send + 'static>;
type OnError = Box<dyn Fn(&failure::Error) + Send + 'static>;

/// A named unit of work for the pool.
///
/// The closure runs once per attempt and receives the pool's cancellation
/// signal. Bodies that can block for long should poll it, otherwise shutdown
/// waits for them until the grace deadline.
///
/// ```
/// use telemetry::thread_pool::Job;
///
/// let job = Job::new("publish", |cancel| {
///     if cancel.is_fired() {
///         return Err(failure::err_msg("cancelled"));
///     }
///     Ok(())
/// })
/// .retries(3)
/// .on_error(|err| eprintln!("publish failed: {}", err));
///
/// assert_eq!(job.name(), "publish");
/// assert!(!job.is_critical());
/// ```
pub struct Job {
    name: String,
    execute: Execute,
    on_error: Option<OnError>,
    retries: u32,
    critical: bool,
}

impl Job {
    pub fn new<N, F>(name: N, execute: F) -> Self
    where
        N: Into<String>,
        // runs on a worker thread, possibly more than once
        F: Fn(&Signal) -> JobResult + Send + 'static,
    {
        Job {
            name: name.into(),
            execute: Box::new(execute),
            on_error: None,
            retries: 0,
            critical: false,
        }
    }

    /// Additional attempts after the first one. Ignored for critical jobs.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// A failed attempt of a critical job shuts the whole pool down.
    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Called after every failed attempt, before any backoff.
    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&failure::Error) + Send + 'static,
    {
        self.on_error = Some(Box::new(on_error));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn retry_budget(&self) -> u32 {
        self.retries
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    // a panicking body counts as a failed attempt
    pub(crate) fn run(&self, cancel: &Signal) -> JobResult {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.execute)(cancel))) {
            Ok(result) => result,
            Err(_) => Err(failure::err_msg(format!("job {} panicked", self.name))),
        }
    }

    // false if the callback panicked; the worker carries on either way
    pub(crate) fn report(&self, err: &failure::Error) -> bool {
        match &self.on_error {
            Some(on_error) => panic::catch_unwind(AssertUnwindSafe(|| on_error(err))).is_ok(),
            None => true,
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("retries", &self.retries)
            .field("critical", &self.critical)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
