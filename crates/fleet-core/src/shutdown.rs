//! Cancellation scopes built on `tokio::sync::watch`.
//!
//! A [`ShutdownTrigger`] owns the sending side; any number of [`Shutdown`]
//! handles observe it. Every loop in the reconciler selects on
//! [`Shutdown::cancelled`] at its wait points, so firing the trigger stops
//! further local progress promptly.

use std::sync::Arc;

use tokio::sync::watch;

/// Create a fresh, unfired cancellation scope.
pub fn scope() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx: Arc::new(tx) }, Shutdown { rx })
}

/// Sending half of a cancellation scope.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
    /// Fire the scope. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new observer of this scope.
    pub fn shutdown(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observing half of a cancellation scope.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// A scope that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the scope fires. Pending forever if the trigger is
    /// dropped without firing.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Derive a child scope that fires when either its own trigger or this
    /// scope fires. Must be called inside a tokio runtime.
    pub fn child(&self) -> (ShutdownTrigger, Shutdown) {
        let (trigger, child) = scope();
        if self.is_cancelled() {
            trigger.cancel();
            return (trigger, child);
        }

        let parent = self.clone();
        let tx = trigger.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => {
                    tx.send_replace(true);
                }
                _ = tx.closed() => {}
            }
        });
        (trigger, child)
    }
}
