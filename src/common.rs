use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lifecycle of a worker pool. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

impl Lifecycle {
    /// true once shutdown has begun
    pub fn is_closing(self) -> bool {
        matches!(self, Lifecycle::ShuttingDown | Lifecycle::Stopped)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Created => "created",
            Lifecycle::Running => "running",
            Lifecycle::ShuttingDown => "shutting-down",
            Lifecycle::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

// a job that panicked while a lock was held must not wedge the pool
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
