//! A timer that expires after a real time interval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::queue::publisher::Publisher;
use crate::sync::spin::SpinMutex;
use crate::sync::waitable::{AvailabilityToken, Waitable, WaitableCore};
use crate::timer::driver::TimerDriver;
use crate::timer::{Timer, TimerResult};

struct LiveState {
    is_pending: bool,
    key: Option<u64>,
}

struct LiveTimerInner {
    state: SpinMutex<LiveState>,
    waiters: WaitableCore,
    publisher: Publisher<TimerResult>,
}

/// A one-shot deadline timer on the shared [`TimerDriver`].
///
/// Each `start` publishes exactly one [`TimerResult`] — `Expired` on natural
/// expiry, `Canceled` when cancelled first. Starting an already pending
/// timer is ignored; restarting after completion is permitted.
pub struct LiveTimer {
    driver: TimerDriver,
    interval: Duration,
    inner: Arc<LiveTimerInner>,
}

impl LiveTimer {
    pub fn new(driver: &TimerDriver, interval: Duration) -> Self {
        Self {
            driver: driver.clone(),
            interval,
            inner: Arc::new(LiveTimerInner {
                state: SpinMutex::new(LiveState {
                    is_pending: false,
                    key: None,
                }),
                waiters: WaitableCore::new(),
                publisher: Publisher::new(),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arms the timer. Ignored while a previous cycle is still pending.
    pub fn start(&self) {
        let mut state = self.inner.state.lock();
        if state.is_pending {
            return;
        }
        state.is_pending = true;
        let weak = Arc::downgrade(&self.inner);
        let key = self.driver.schedule(
            self.interval,
            Box::new(move |result| {
                if let Some(inner) = weak.upgrade() {
                    let mut state = inner.state.lock();
                    inner.publisher.push(result);
                    state.is_pending = false;
                    state.key = None;
                    drop(state);
                    inner.waiters.notify_all();
                }
            }),
        );
        // The completion may already have fired; it blocks on the state lock
        // held here, so the key lands before pending clears.
        state.key = Some(key);
    }

    /// Requests cancellation and suspends until the pending flag clears.
    /// A no-op on an idle timer.
    pub async fn cancel(&self) {
        let key = {
            let mut state = self.inner.state.lock();
            if !state.is_pending {
                return;
            }
            state.key.take()
        };
        if let Some(key) = key {
            // false means the expiry is in flight; wait drains either way.
            self.driver.cancel(key);
        }
        self.wait().await;
    }

    /// Suspends until the timer is not pending.
    pub async fn wait(&self) {
        self.inner
            .waiters
            .wait_until(|| (!self.inner.state.lock().is_pending).then_some(()))
            .await;
    }

    pub fn publisher(&self) -> &Publisher<TimerResult> {
        &self.inner.publisher
    }
}

#[async_trait]
impl Timer for LiveTimer {
    fn start(&self) {
        LiveTimer::start(self);
    }

    async fn cancel(&self) {
        LiveTimer::cancel(self).await;
    }

    async fn wait(&self) {
        LiveTimer::wait(self).await;
    }

    fn publisher(&self) -> &Publisher<TimerResult> {
        LiveTimer::publisher(self)
    }
}

impl Waitable for LiveTimer {
    fn is_available(&self) -> bool {
        !self.inner.state.lock().is_pending
    }

    fn watch(&self, token: &Arc<AvailabilityToken>) {
        self.inner.waiters.register_token(token);
    }
}

impl Drop for LiveTimer {
    fn drop(&mut self) {
        let key = self.inner.state.lock().key.take();
        if let Some(key) = key {
            self.driver.cancel(key);
        }
    }
}
