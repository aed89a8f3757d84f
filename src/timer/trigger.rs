//! A timer that expires when explicitly told to.

use std::sync::Arc;

use async_trait::async_trait;

use crate::queue::publisher::Publisher;
use crate::sync::spin::SpinMutex;
use crate::sync::waitable::{AvailabilityToken, Waitable, WaitableCore};
use crate::timer::{Timer, TimerResult};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
    PreTriggered,
}

struct TriggerState {
    phase: Phase,
    result: TimerResult,
}

/// A timer with no real deadline: [`TriggerTimer::trigger`] or
/// [`TriggerTimer::fail`] completes it.
///
/// Triggering before `start` latches the result, which the next `start`
/// publishes immediately, so test and adapter code never loses a result to
/// ordering. One result is published per `start` cycle.
pub struct TriggerTimer {
    state: SpinMutex<TriggerState>,
    waiters: WaitableCore,
    publisher: Publisher<TimerResult>,
}

impl TriggerTimer {
    pub fn new() -> Self {
        Self {
            state: SpinMutex::new(TriggerState {
                phase: Phase::Idle,
                result: TimerResult::Expired,
            }),
            waiters: WaitableCore::new(),
            publisher: Publisher::new(),
        }
    }

    /// Completes the current cycle with [`TimerResult::Expired`], or latches
    /// it when the timer has not started yet.
    pub fn trigger(&self) {
        self.complete(TimerResult::Expired);
    }

    /// Completes the current cycle with [`TimerResult::Fail`], or latches it
    /// when the timer has not started yet.
    pub fn fail(&self) {
        self.complete(TimerResult::Fail);
    }

    pub fn start(&self) {
        let published = {
            let mut state = self.state.lock();
            match state.phase {
                Phase::Idle => {
                    state.phase = Phase::Started;
                    false
                }
                Phase::PreTriggered => {
                    self.publish(&mut state);
                    true
                }
                Phase::Started => false,
            }
        };
        if published {
            self.waiters.notify_all();
        }
    }

    /// Publishes `Canceled` for a started cycle, or the latched result for a
    /// pre-triggered one. A no-op on an idle timer.
    pub async fn cancel(&self) {
        let published = {
            let mut state = self.state.lock();
            match state.phase {
                Phase::Started => {
                    state.result = TimerResult::Canceled;
                    self.publish(&mut state);
                    true
                }
                Phase::PreTriggered => {
                    self.publish(&mut state);
                    true
                }
                Phase::Idle => false,
            }
        };
        if published {
            self.waiters.notify_all();
        }
    }

    /// Suspends until the timer returns to idle.
    pub async fn wait(&self) {
        self.waiters
            .wait_until(|| (self.state.lock().phase == Phase::Idle).then_some(()))
            .await;
    }

    pub fn publisher(&self) -> &Publisher<TimerResult> {
        &self.publisher
    }

    fn complete(&self, result: TimerResult) {
        let published = {
            let mut state = self.state.lock();
            state.result = result;
            match state.phase {
                Phase::Idle => {
                    state.phase = Phase::PreTriggered;
                    false
                }
                Phase::Started => {
                    self.publish(&mut state);
                    true
                }
                Phase::PreTriggered => false,
            }
        };
        if published {
            self.waiters.notify_all();
        }
    }

    fn publish(&self, state: &mut TriggerState) {
        self.publisher.push(state.result);
        state.phase = Phase::Idle;
    }
}

impl Default for TriggerTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Timer for TriggerTimer {
    fn start(&self) {
        TriggerTimer::start(self);
    }

    async fn cancel(&self) {
        TriggerTimer::cancel(self).await;
    }

    async fn wait(&self) {
        TriggerTimer::wait(self).await;
    }

    fn publisher(&self) -> &Publisher<TimerResult> {
        TriggerTimer::publisher(self)
    }
}

impl Waitable for TriggerTimer {
    fn is_available(&self) -> bool {
        self.state.lock().phase == Phase::Idle
    }

    fn watch(&self, token: &Arc<AvailabilityToken>) {
        self.waiters.register_token(token);
    }
}

#[cfg(test)]
mod tests {
    use super::TriggerTimer;
    use crate::queue::queue::Queue;
    use crate::routine::block_on;
    use crate::timer::TimerResult;

    #[test]
    fn trigger_after_start_publishes_expired() {
        let timer = TriggerTimer::new();
        let results = Queue::new();
        timer.publisher().monitor(results.clone() as _);
        timer.start();
        timer.trigger();
        assert_eq!(block_on(results.pop()).expect("result"), TimerResult::Expired);
    }

    #[test]
    fn trigger_before_start_is_latched() {
        let timer = TriggerTimer::new();
        let results = Queue::new();
        timer.publisher().monitor(results.clone() as _);
        timer.trigger();
        assert!(results.is_empty());
        timer.start();
        assert_eq!(block_on(results.pop()).expect("result"), TimerResult::Expired);
    }

    #[test]
    fn cancel_on_started_publishes_canceled() {
        let timer = TriggerTimer::new();
        let results = Queue::new();
        timer.publisher().monitor(results.clone() as _);
        timer.start();
        block_on(timer.cancel());
        assert_eq!(
            block_on(results.pop()).expect("result"),
            TimerResult::Canceled
        );
    }

    #[test]
    fn cancel_on_idle_is_a_no_op() {
        let timer = TriggerTimer::new();
        let results = Queue::new();
        timer.publisher().monitor(results.clone() as _);
        block_on(timer.cancel());
        assert!(results.is_empty());
        block_on(timer.wait());
    }

    #[test]
    fn fail_publishes_fail() {
        let timer = TriggerTimer::new();
        let results = Queue::new();
        timer.publisher().monitor(results.clone() as _);
        timer.start();
        timer.fail();
        assert_eq!(block_on(results.pop()).expect("result"), TimerResult::Fail);
    }
}
