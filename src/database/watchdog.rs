//! Rearmable idle timer.
//!
//! Each call to [`IdleWatchdog::arm`] cancels the pending timer and starts a
//! new one. Cancellation only reaches a timer that is still sleeping: once the
//! timeout has elapsed the callback runs to completion. Every arm bumps an
//! epoch; the fired task receives a [`WatchdogTicket`] and must check
//! [`WatchdogTicket::is_current`] once it holds whatever lock guards the
//! resource, so a timer that lost the race with fresh activity never acts.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct IdleWatchdog {
    timeout: Duration,
    epoch: Arc<AtomicU64>,
    pending: Mutex<Option<CancellationToken>>,
}

impl IdleWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            epoch: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Cancels any sleeping timer and schedules `on_fire` after the timeout.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn arm<F, Fut>(&self, on_fire: F)
    where
        F: FnOnce(WatchdogTicket) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.cancel();
        }

        let ticket = WatchdogTicket {
            epoch: self.epoch.fetch_add(1, Ordering::SeqCst) + 1,
            current: Arc::clone(&self.epoch),
        };
        let token = CancellationToken::new();
        let sleeping = token.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = sleeping.cancelled() => return,
                _ = tokio::time::sleep(timeout) => {}
            }
            // Fired: later cancels must not interrupt the callback.
            sleeping.cancel();
            on_fire(ticket).await;
        });
        *pending = Some(token);
    }

    /// Stops the pending timer, if any. Tickets already handed out go stale.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = pending.take() {
            token.cancel();
        }
    }

    /// Whether a timer is still counting down.
    pub fn is_armed(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

impl Drop for IdleWatchdog {
    fn drop(&mut self) {
        if let Some(token) = self.pending.get_mut().take() {
            token.cancel();
        }
    }
}

impl std::fmt::Debug for IdleWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleWatchdog")
            .field("timeout", &self.timeout)
            .field("epoch", &self.epoch.load(Ordering::SeqCst))
            .finish()
    }
}

/// Identifies the arm that spawned a fired timer.
#[derive(Debug)]
pub struct WatchdogTicket {
    epoch: u64,
    current: Arc<AtomicU64>,
}

impl WatchdogTicket {
    /// False once the watchdog was re-armed or cancelled after this ticket was issued.
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_arm(watchdog: &IdleWatchdog, fired: &Arc<AtomicUsize>) {
        let fired = Arc::clone(fired);
        watchdog.arm(move |ticket| async move {
            if ticket.is_current() {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_timeout() {
        let watchdog = IdleWatchdog::new(Duration::from_secs(60));
        let fired = Arc::new(AtomicUsize::new(0));
        counting_arm(&watchdog, &fired);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!watchdog.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_postpones_firing() {
        let watchdog = IdleWatchdog::new(Duration::from_secs(60));
        let fired = Arc::new(AtomicUsize::new(0));
        counting_arm(&watchdog, &fired);

        tokio::time::sleep(Duration::from_secs(45)).await;
        counting_arm(&watchdog, &fired);

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let watchdog = IdleWatchdog::new(Duration::from_secs(10));
        let fired = Arc::new(AtomicUsize::new(0));
        counting_arm(&watchdog, &fired);
        assert!(watchdog.is_armed());

        watchdog.cancel();
        assert!(!watchdog.is_armed());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_does_not_interrupt_fired_callback() {
        let watchdog = IdleWatchdog::new(Duration::from_secs(60));
        let completed = Arc::new(AtomicUsize::new(0));
        {
            let completed = Arc::clone(&completed);
            watchdog.arm(move |_ticket| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                completed.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!watchdog.is_armed());
        watchdog.arm(|_ticket| async {});
        watchdog.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ticket_goes_stale_after_new_epoch() {
        let current = Arc::new(AtomicU64::new(3));
        let ticket = WatchdogTicket {
            epoch: 3,
            current: Arc::clone(&current),
        };
        assert!(ticket.is_current());
        current.fetch_add(1, Ordering::SeqCst);
        assert!(!ticket.is_current());
    }
}
