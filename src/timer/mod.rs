//! Cooperative timers.
//!
//! A timer is armed with `start`, leaves its pending state through natural
//! expiry, cancellation, or failure, and publishes exactly one
//! [`TimerResult`] per `start` cycle to every monitoring queue. `wait` and
//! `cancel` suspend the current routine, never the OS thread.

pub mod driver;
pub mod live;
pub mod trigger;

use async_trait::async_trait;

use crate::queue::publisher::Publisher;

/// The outcome of one timer cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerResult {
    Expired,
    Canceled,
    Fail,
}

/// The contract shared by every timer implementation.
#[async_trait]
pub trait Timer: Send + Sync {
    /// Arms the timer; ignored while a cycle is already pending.
    fn start(&self);

    /// Forces the cycle to complete and suspends until it has.
    async fn cancel(&self);

    /// Suspends until the timer is not pending.
    async fn wait(&self);

    /// The publisher delivering one [`TimerResult`] per cycle.
    fn publisher(&self) -> &Publisher<TimerResult>;
}

pub use driver::TimerDriver;
pub use live::LiveTimer;
pub use trigger::TriggerTimer;
