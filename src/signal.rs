use crate::common::lock;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A one-shot broadcast signal.
///
/// Nothing is ever sent on the inner channel. Firing drops the only sender,
/// which disconnects every receiver at once, so a fired signal is also ready
/// inside `crossbeam::select!`.
///
/// The pool hands out clones as its cancellation handle (`context`) and its
/// completion handle (`done`). Clones observe the same state.
#[derive(Clone, Debug)]
pub struct Signal {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    trigger: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

impl Signal {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(0);
        Signal {
            inner: Arc::new(Inner {
                trigger: Mutex::new(Some(sender)),
                receiver,
            }),
        }
    }

    /// Fire the signal. Returns false if it had already fired.
    pub(crate) fn fire(&self) -> bool {
        lock(&self.inner.trigger).take().is_some()
    }

    pub fn is_fired(&self) -> bool {
        matches!(
            self.inner.receiver.try_recv(),
            Err(TryRecvError::Disconnected)
        )
    }

    /// Block until the signal fires.
    pub fn wait(&self) {
        // recv only returns once the sender is gone
        let _ = self.inner.receiver.recv();
    }

    /// Block for at most `timeout`. Returns true if the signal fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.inner.receiver.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Receiver that becomes ready (disconnected) once the signal fires.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.inner.receiver
    }
}

impl Default for Signal {
    fn default() -> Self {
        Signal::new()
    }
}
