//! Flow timeout watchdog
//!
//! A login that never receives its redirect must not hold the listener port
//! forever. The watchdog races the redirect and the cancel path to resolve
//! the shared completion signal; the signal's single-fire semantics mean a
//! late watchdog can never clobber a completed flow, and disarming stops the
//! timer task as soon as the flow finishes some other way.

use crate::signal::{CompletionSignal, FlowWake};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

pub struct TimeoutWatchdog {
    handle: JoinHandle<()>,
}

impl TimeoutWatchdog {
    /// Arm the watchdog: after `timeout`, resolve `signal` with `TimedOut`.
    /// Fires at most once.
    pub fn arm(signal: Arc<CompletionSignal>, timeout: Duration) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if signal.resolve(FlowWake::TimedOut) {
                warn!(
                    "Login timed out after {}s without a redirect",
                    timeout.as_secs()
                );
            }
        });
        Self { handle }
    }

    /// Stop the timer. Called as soon as the flow completes by any other
    /// path, guaranteeing the watchdog never fires after success.
    pub fn disarm(&self) {
        self.handle.abort();
    }
}

impl Drop for TimeoutWatchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watchdog_resolves_with_timeout() {
        let (signal, rx) = CompletionSignal::new();
        let _watchdog = TimeoutWatchdog::arm(Arc::clone(&signal), Duration::from_millis(10));

        let wake = rx.await.unwrap();
        assert!(matches!(wake, FlowWake::TimedOut));
    }

    #[tokio::test]
    async fn test_disarm_prevents_firing() {
        let (signal, mut rx) = CompletionSignal::new();
        let watchdog = TimeoutWatchdog::arm(Arc::clone(&signal), Duration::from_millis(20));

        watchdog.disarm();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_watchdog_never_overrides_earlier_resolution() {
        let (signal, rx) = CompletionSignal::new();
        let _watchdog = TimeoutWatchdog::arm(Arc::clone(&signal), Duration::from_millis(10));

        signal.resolve(FlowWake::Cancelled);
        tokio::time::sleep(Duration::from_millis(40)).await;

        let wake = rx.await.unwrap();
        assert!(matches!(wake, FlowWake::Cancelled));
    }
}
