//! One-way shutdown gate built on `tokio::sync::watch`.
//!
//! The owner raises it once; every clone of [`Exit`] observes it, whether it
//! was waiting already or checks later. Dropping the owner counts as raised.

use tokio::sync::watch;

/// Owner side of the gate.
#[derive(Debug)]
pub struct ExitSignal {
    tx: watch::Sender<bool>,
}

/// Observer side of the gate.
#[derive(Debug, Clone)]
pub struct Exit {
    rx: watch::Receiver<bool>,
}

impl ExitSignal {
    pub fn new() -> (Self, Exit) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, Exit { rx })
    }

    /// Raise the gate. Returns `false` if it was already raised.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|exited| !std::mem::replace(exited, true))
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> Exit {
        Exit { rx: self.tx.subscribe() }
    }
}

impl Exit {
    /// Resolves once the gate is raised (or its owner is gone).
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|exited| *exited).await;
    }

    pub fn is_fired(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}
