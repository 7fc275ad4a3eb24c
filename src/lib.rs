//! A bounded worker pool for telemetry jobs.
//!
//! Jobs carry their own retry budget. Non-critical failures are retried with
//! linear backoff and counted once exhausted; a failed critical job cancels
//! every worker and shuts the pool down within a grace deadline.

pub mod common;
pub mod config;
pub mod error;
pub mod logging;
pub mod signal;
pub mod thread_pool;

pub use common::Lifecycle;
pub use error::{Error, ErrorKind, Result};
pub use signal::Signal;
pub use thread_pool::{Job, JobResult, WorkerPool};
