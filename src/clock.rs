//! Scheduler abstraction for timer-driven work.
//!
//! Engines never call `tokio::time::sleep` directly. Production wiring uses
//! [`TokioClock`]; unit tests use `ManualClock`, a virtual clock that only
//! moves when the test advances it.

#[cfg(test)]
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use tokio::sync::{Notify, oneshot};

/// Source of delays for simulated async work.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Suspend the caller for `duration` of this clock's time.
    async fn sleep(&self, duration: Duration);
}

/// Real timer backed by the tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
struct Sleeper {
    deadline: Duration,
    wake: oneshot::Sender<()>,
}

#[cfg(test)]
#[derive(Default)]
struct ManualState {
    now: Duration,
    sleepers: Vec<Sleeper>,
    registered: u64,
}

/// Virtual clock for tests.
///
/// `sleep` parks the caller until enough virtual time has been advanced past
/// its deadline. Deadlines are computed when `sleep` is called, so tests
/// should wait for the sleeper to park (see [`ManualClock::wait_for_sleepers`])
/// before advancing.
#[cfg(test)]
#[derive(Default)]
pub struct ManualClock {
    state: Mutex<ManualState>,
    parked: Notify,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current virtual time since the clock was created.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of callers currently parked in `sleep`.
    pub fn sleepers(&self) -> usize {
        self.lock()
            .sleepers
            .iter()
            .filter(|s| !s.wake.is_closed())
            .count()
    }

    /// Total number of `sleep` calls so far, including finished ones.
    pub fn registrations(&self) -> u64 {
        self.lock().registered
    }

    /// Move virtual time forward and wake every sleeper whose deadline passed.
    pub fn advance(&self, by: Duration) {
        let due = {
            let mut state = self.lock();
            state.now += by;
            let now = state.now;
            let (due, pending): (Vec<_>, Vec<_>) =
                state.sleepers.drain(..).partition(|s| s.deadline <= now);
            state.sleepers = pending;
            due
        };
        for sleeper in due {
            let _ = sleeper.wake.send(());
        }
    }

    /// Wait until at least `count` callers are parked in `sleep`.
    pub async fn wait_for_sleepers(&self, count: usize) {
        loop {
            let notified = self.parked.notified();
            if self.sleepers() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Wait until `sleep` has been called at least `count` times in total.
    ///
    /// Unlike [`ManualClock::wait_for_sleepers`] this ignores sleepers left
    /// behind by a cancelled task that has not been polled yet.
    pub async fn wait_for_registrations(&self, count: u64) {
        loop {
            let notified = self.parked.notified();
            if self.registrations() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Wait for one parked sleeper, then advance by `by`.
    pub async fn advance_parked(&self, by: Duration) {
        self.wait_for_sleepers(1).await;
        self.advance(by);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // A poisoned lock only means a test panicked mid-advance.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.lock();
            let deadline = state.now + duration;
            state.sleepers.push(Sleeper { deadline, wake: tx });
            state.registered += 1;
        }
        self.parked.notify_waiters();
        // Dropping the clock releases every sleeper.
        let _ = rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_clock_wakes_only_after_deadline() {
        let clock = ManualClock::new();
        let sleeper = {
            let clock = Arc::clone(&clock);
            tokio::spawn(async move { clock.sleep(Duration::from_secs(2)).await })
        };

        clock.wait_for_sleepers(1).await;
        clock.advance(Duration::from_secs(1));
        tokio::task::yield_now().await;
        assert!(!sleeper.is_finished());
        assert_eq!(clock.sleepers(), 1);

        clock.advance(Duration::from_secs(1));
        sleeper.await.unwrap();
        assert_eq!(clock.registrations(), 1);
        assert_eq!(clock.now(), Duration::from_secs(2));
        assert_eq!(clock.sleepers(), 0);
    }

    #[tokio::test]
    async fn dropped_sleep_is_not_counted() {
        let clock = ManualClock::new();
        {
            let fut = clock.sleep(Duration::from_secs(5));
            // Poll once so it registers, then drop it.
            let _ = tokio::time::timeout(Duration::from_millis(1), fut).await;
        }
        assert_eq!(clock.sleepers(), 0);
    }

    #[tokio::test]
    async fn tokio_clock_sleeps() {
        let start = tokio::time::Instant::now();
        TokioClock.sleep(Duration::from_millis(5)).await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
