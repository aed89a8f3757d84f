//! The bootstrap bundle: scheduler, timer driver, reactor.
//!
//! Resource constructors take their executor explicitly — a
//! [`crate::timer::LiveTimer`] takes a [`TimerDriver`], socket constructors
//! take a [`Reactor`]. The process-wide singleton is confined to the single
//! [`Runtime::global`] entry point; everything else is handle passing.

use std::future::Future;
use std::sync::OnceLock;
use std::thread;

use crate::net::reactor::Reactor;
use crate::routine::scheduler::{JoinHandle, Scheduler};
use crate::timer::driver::TimerDriver;

#[derive(Clone, Copy, Debug)]
pub struct RuntimeConfig {
    /// Number of scheduler worker threads.
    pub worker_count: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_count: thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(2),
        }
    }
}

/// Owns one scheduler, one timer driver, and one reactor.
pub struct Runtime {
    scheduler: Scheduler,
    timers: TimerDriver,
    reactor: Reactor,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> crate::Result<Self> {
        Ok(Self {
            scheduler: Scheduler::new(config.worker_count),
            timers: TimerDriver::new(),
            reactor: Reactor::new()?,
        })
    }

    /// The lazily initialized process-wide runtime. It lives until process
    /// exit; create a [`Runtime`] explicitly for a bounded lifetime.
    pub fn global() -> &'static Runtime {
        static GLOBAL: OnceLock<Runtime> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            Runtime::new(RuntimeConfig::default()).expect("bootstrap global runtime")
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn timers(&self) -> &TimerDriver {
        &self.timers
    }

    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    /// Spawns a routine on this runtime's scheduler.
    pub fn spawn<F>(&self, future: F) -> JoinHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.scheduler.spawn(future)
    }

    /// Stops the worker pool and both driver threads. Suspended routines are
    /// abandoned; close the resources they wait on first.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.timers.shutdown();
        self.reactor.shutdown();
    }
}
