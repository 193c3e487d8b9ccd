//! Single-resolution completion primitive
//!
//! One login has exactly one completion. The redirect handler, the timeout
//! watchdog, and an explicit cancel all race to deliver it; whichever writes
//! first wins and every later write is a no-op. This is the only
//! synchronization crossing the listener/coordinator boundary.

use crate::callback::RedirectOutcome;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

/// What woke the coordinator out of its wait.
#[derive(Debug, Clone)]
pub enum FlowWake {
    /// The browser redirect arrived
    Redirect(RedirectOutcome),

    /// The watchdog fired before any redirect
    TimedOut,

    /// The user (or the application shutting down) cancelled the login
    Cancelled,
}

/// First-writer-wins wrapper around a oneshot sender.
pub struct CompletionSignal {
    tx: Mutex<Option<oneshot::Sender<FlowWake>>>,
}

impl CompletionSignal {
    pub fn new() -> (Arc<Self>, oneshot::Receiver<FlowWake>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Resolve the signal with `wake`. Returns false when the signal was
    /// already resolved; the value is dropped in that case.
    pub fn resolve(&self, wake: FlowWake) -> bool {
        match self.tx.lock().take() {
            Some(tx) => tx.send(wake).is_ok(),
            None => false,
        }
    }
}
