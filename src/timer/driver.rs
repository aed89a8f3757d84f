//! The shared deadline driver behind every live timer.

use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use log::debug;

use crate::timer::TimerResult;

pub(crate) type Completion = Box<dyn FnOnce(TimerResult) + Send>;

struct DriverState {
    deadlines: BinaryHeap<std::cmp::Reverse<(quanta::Instant, u64)>>,
    completions: HashMap<u64, Completion>,
    shutdown: bool,
}

struct DriverShared {
    state: Mutex<DriverState>,
    signal: Condvar,
    clock: quanta::Clock,
    next_key: AtomicU64,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

/// One thread sleeping on a min-heap of deadlines.
///
/// Completions run on the driver thread when a deadline elapses, or on the
/// cancelling caller's thread. The driver never holds its own lock across a
/// completion, so completions may take timer-local locks freely.
#[derive(Clone)]
pub struct TimerDriver {
    shared: Arc<DriverShared>,
}

impl TimerDriver {
    pub fn new() -> Self {
        let shared = Arc::new(DriverShared {
            state: Mutex::new(DriverState {
                deadlines: BinaryHeap::new(),
                completions: HashMap::new(),
                shutdown: false,
            }),
            signal: Condvar::new(),
            clock: quanta::Clock::new(),
            next_key: AtomicU64::new(1),
            thread: Mutex::new(None),
        });
        let run_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("girder-timer".into())
            .spawn(move || Self::run(&run_shared))
            .expect("spawn timer thread");
        *shared.thread.lock().expect("thread lock") = Some(handle);
        Self { shared }
    }

    /// Arms a one-shot deadline `delay` from now. The returned key cancels
    /// it.
    pub(crate) fn schedule(&self, delay: Duration, completion: Completion) -> u64 {
        let key = self.shared.next_key.fetch_add(1, Ordering::Relaxed);
        let deadline = self.shared.clock.now() + delay;
        {
            let mut state = self.shared.state.lock().expect("driver lock");
            state.deadlines.push(std::cmp::Reverse((deadline, key)));
            state.completions.insert(key, completion);
        }
        self.shared.signal.notify_one();
        key
    }

    /// Cancels a scheduled deadline. Runs the completion with
    /// [`TimerResult::Canceled`] on the calling thread and returns `true`,
    /// unless the deadline already completed.
    pub(crate) fn cancel(&self, key: u64) -> bool {
        let completion = self
            .shared
            .state
            .lock()
            .expect("driver lock")
            .completions
            .remove(&key);
        match completion {
            Some(completion) => {
                completion(TimerResult::Canceled);
                true
            }
            None => false,
        }
    }

    /// Stops the driver thread. Outstanding deadlines never complete.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock().expect("driver lock");
            state.shutdown = true;
        }
        self.shared.signal.notify_all();
        let handle = self.shared.thread.lock().expect("thread lock").take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn run(shared: &Arc<DriverShared>) {
        debug!("timer driver started");
        let mut state = shared.state.lock().expect("driver lock");
        loop {
            if state.shutdown {
                return;
            }
            let Some(std::cmp::Reverse((deadline, key))) = state.deadlines.peek().copied()
            else {
                state = shared.signal.wait(state).expect("driver wait");
                continue;
            };
            let now = shared.clock.now();
            if deadline <= now {
                state.deadlines.pop();
                // A key absent from the map was cancelled; skip its husk.
                if let Some(completion) = state.completions.remove(&key) {
                    drop(state);
                    completion(TimerResult::Expired);
                    state = shared.state.lock().expect("driver lock");
                }
            } else {
                let (guard, _) = shared
                    .signal
                    .wait_timeout(state, deadline.duration_since(now))
                    .expect("driver wait");
                state = guard;
            }
        }
    }
}

impl Default for TimerDriver {
    fn default() -> Self {
        Self::new()
    }
}
