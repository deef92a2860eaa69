use std::time::Duration;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Select, Sender, TryRecvError};
use crate::error::{HandOffError, PutError};

pub fn rendezvous<T>() -> (Producer<T>, Consumer<T>) {
    let (tx, rx) = bounded(0);
    (Producer { tx }, Consumer { rx })
}

pub fn cancellation() -> (Canceller, CancelToken) {
    let (tx, rx) = bounded(0);
    (Canceller { _tx: tx }, CancelToken { rx })
}

pub struct Producer<T> {
    tx: Sender<T>,
}

pub struct Consumer<T> {
    rx: Receiver<T>,
}

pub struct Canceller {
    // never sent on; dropping it disconnects the tokens
    _tx: Sender<()>,
}

#[derive(Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
}

impl Canceller {
    pub fn cancel(self) {}
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}

impl<T> Producer<T> {
    /// Hands `value` to a waiting consumer. On failure the value comes back inside the error.
    pub fn put(&self, value: T, timeout: Duration, cancel: &CancelToken) -> Result<(), PutError<T>> {
        if cancel.is_cancelled() {
            return Err(PutError { kind: HandOffError::Cancelled, value });
        }

        let mut sel = Select::new();
        let data = sel.send(&self.tx);
        let stop = sel.recv(&cancel.rx);
        match sel.select_timeout(timeout) {
            Err(_) => Err(PutError { kind: HandOffError::TimedOut(timeout), value }),
            Ok(op) if op.index() == data => op.send(&self.tx, value)
                .map_err(|err| PutError { kind: HandOffError::Disconnected, value: err.into_inner() }),
            Ok(op) => {
                debug_assert_eq!(op.index(), stop);
                let _ = op.recv(&cancel.rx);
                Err(PutError { kind: HandOffError::Cancelled, value })
            }
        }
    }
}

impl<T> Consumer<T> {
    pub fn take(&self, timeout: Duration, cancel: &CancelToken) -> Result<T, HandOffError> {
        if cancel.is_cancelled() {
            return Err(HandOffError::Cancelled);
        }

        let mut sel = Select::new();
        let data = sel.recv(&self.rx);
        let stop = sel.recv(&cancel.rx);
        match sel.select_timeout(timeout) {
            Err(_) => Err(HandOffError::TimedOut(timeout)),
            Ok(op) if op.index() == data => op.recv(&self.rx).map_err(|_| HandOffError::Disconnected),
            Ok(op) => {
                debug_assert_eq!(op.index(), stop);
                let _ = op.recv(&cancel.rx);
                Err(HandOffError::Cancelled)
            }
        }
    }

    pub fn take_timeout(&self, timeout: Duration) -> Result<T, HandOffError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => HandOffError::TimedOut(timeout),
            RecvTimeoutError::Disconnected => HandOffError::Disconnected,
        })
    }
}
