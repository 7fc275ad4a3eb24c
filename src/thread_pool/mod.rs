mod job;
mod pool;
mod supervisor;
mod worker;

pub use job::{Job, JobResult};
pub use pool::WorkerPool;

/// A critical failure reported by a worker to the supervisor.
pub(crate) struct Escalation {
    pub job: String,
    pub error: failure::Error,
}
