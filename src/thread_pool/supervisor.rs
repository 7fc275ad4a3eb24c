use super::pool::Shared;
use super::Escalation;
use crate::common::lock;
use crate::signal::Signal;
use crossbeam::channel::Receiver;
use crossbeam::select;
use slog::{debug, error, Logger};
use std::sync::Weak;

/// Watches for critical job failures and shuts the pool down on the first one.
pub(crate) struct Supervisor {
    receiver: Receiver<Escalation>,
    cancel: Signal,
    // weak so that dropping the pool is not held up by this thread
    pool: Weak<Shared>,
    logger: Logger,
}

impl Supervisor {
    pub fn new(
        receiver: Receiver<Escalation>,
        cancel: Signal,
        pool: Weak<Shared>,
        logger: Logger,
    ) -> Self {
        Supervisor {
            receiver,
            cancel,
            pool,
            logger,
        }
    }

    pub fn watch(self) {
        select! {
            recv(self.cancel.receiver()) -> _ => {
                debug!(self.logger, "pool cancelled, supervisor exiting");
            }
            recv(self.receiver) -> message => match message {
                Ok(escalation) => self.escalate(escalation),
                Err(_) => debug!(self.logger, "escalation channel closed"),
            },
        }
    }

    fn escalate(&self, escalation: Escalation) {
        error!(self.logger, "critical error encountered: {}", escalation.error; "job" => &escalation.job);
        if let Some(pool) = self.pool.upgrade() {
            *lock(&pool.critical) = Some(format!("{}: {}", escalation.job, escalation.error));
            pool.shutdown();
        }
    }
}
