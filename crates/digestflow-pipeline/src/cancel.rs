//! Broadcast cancellation signal.
//!
//! Cancellation is cooperative: tasks only notice a fired signal at their
//! next checkpoint. A worker blocked inside a single slow read keeps going
//! until that read returns.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};

/// Single-fire, level-triggered stop notification.
///
/// Clones observe the same signal. Firing is idempotent and permanent.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
}

impl CancelSignal {
    /// Create a signal in the active state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Later calls have no further effect.
    pub fn fire(&self) {
        self.token.cancel();
    }

    /// Non-blocking poll.
    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal has fired.
    ///
    /// Meant as one arm of a `tokio::select!`.
    pub fn fired(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Derived signal that fires with this one but can also fire alone.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Fire the signal once `after` has elapsed.
    ///
    /// Must be called from within a tokio runtime. The timer task exits
    /// early if the signal fires first; abort the returned handle to disarm
    /// the deadline.
    pub fn fire_after(&self, after: Duration) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    tracing::debug!(?after, "deadline reached, firing cancellation");
                    token.cancel();
                }
            }
        })
    }

    /// Scoped cleanup: the signal fires when the guard is dropped.
    pub fn guard(&self) -> CancelGuard {
        CancelGuard {
            inner: self.token.clone().drop_guard(),
        }
    }
}

/// Fires its signal on drop unless disarmed.
#[derive(Debug)]
pub struct CancelGuard {
    inner: DropGuard,
}

impl CancelGuard {
    /// Leave the signal untouched when this guard goes away.
    pub fn disarm(self) {
        self.inner.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_is_idempotent() {
        let signal = CancelSignal::new();
        assert!(!signal.is_fired());

        signal.fire();
        assert!(signal.is_fired());
        signal.fire();
        assert!(signal.is_fired());
    }

    #[test]
    fn test_clones_share_state() {
        let signal = CancelSignal::new();
        let observer = signal.clone();
        signal.fire();
        assert!(observer.is_fired());
    }

    #[test]
    fn test_child_does_not_fire_parent() {
        let parent = CancelSignal::new();
        let child = parent.child();

        child.fire();
        assert!(child.is_fired());
        assert!(!parent.is_fired());

        let child = parent.child();
        parent.fire();
        assert!(child.is_fired());
    }

    #[test]
    fn test_guard_fires_on_drop() {
        let signal = CancelSignal::new();
        {
            let _guard = signal.guard();
        }
        assert!(signal.is_fired());
    }

    #[test]
    fn test_disarmed_guard_leaves_signal() {
        let signal = CancelSignal::new();
        let guard = signal.guard();
        guard.disarm();
        assert!(!signal.is_fired());
    }

    #[tokio::test]
    async fn test_fired_wakes_waiters() {
        let signal = CancelSignal::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let signal = signal.clone();
                tokio::spawn(async move { signal.fired().await })
            })
            .collect();

        signal.fire();
        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_aborted_deadline_never_fires() {
        let signal = CancelSignal::new();
        let timer = signal.fire_after(Duration::from_millis(10));
        timer.abort();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!signal.is_fired());
    }

    #[tokio::test]
    async fn test_fire_after_deadline() {
        let signal = CancelSignal::new();
        let _timer = signal.fire_after(Duration::from_millis(20));
        assert!(!signal.is_fired());

        tokio::time::timeout(Duration::from_secs(2), signal.fired())
            .await
            .unwrap();
        assert!(signal.is_fired());
    }
}
