//! The cooperative routine scheduler.
//!
//! A fixed pool of OS worker threads multiplexes an arbitrary number of
//! routines. Routines are ordinary futures: a suspending primitive parks the
//! routine by returning `Pending` after enrolling a wake handle, and a
//! `resume` (waker fire) moves it back onto the global FIFO ready queue.
//!
//! The suspend/resume race is resolved by a per-routine state machine:
//!
//! ```text
//! Pending ──pop──► Running ──poll Ready──► Complete
//!    ▲                │ │
//!    │     poll Pending │ └─resume while running─► PendingSuspend
//!    │                ▼ ▼                              │
//!    └──resume── Suspended                (requeued after the poll) ─► Pending
//! ```
//!
//! A resume that observes `Running` cannot know whether the routine has
//! already enrolled its wake handle, so it parks the wakeup in
//! `PendingSuspend`; the worker converts it into an immediate requeue and the
//! suspension degenerates into a yield. All transitions are single
//! acquire/release CAS steps on one atomic.

use std::cell::Cell;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Wake, Waker};
use std::thread;

use log::{debug, error};

/// Identifies a spawned routine for the lifetime of the process.
pub type RoutineId = u64;

/// Identifies the logical caller of a primitive: a routine when invoked from
/// inside the scheduler, otherwise the OS thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionId {
    Routine(RoutineId),
    Thread(thread::ThreadId),
}

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const PENDING_SUSPEND: u8 = 2;
const SUSPENDED: u8 = 3;
const COMPLETE: u8 = 4;

thread_local! {
    static CURRENT: Cell<Option<RoutineId>> = const { Cell::new(None) };
}

/// Returns the routine currently executing on this worker thread, if any.
pub fn current() -> Option<RoutineId> {
    CURRENT.with(|current| current.get())
}

/// Whether the caller runs inside a routine, as opposed to a plain OS thread.
///
/// Primitives use this to distinguish a cooperative yield from an OS-thread
/// block ([`block_on`]).
pub fn is_inside_routine() -> bool {
    current().is_some()
}

/// The routine id when inside a routine, otherwise the OS thread id.
pub fn execution_id() -> ExecutionId {
    match current() {
        Some(id) => ExecutionId::Routine(id),
        None => ExecutionId::Thread(thread::current().id()),
    }
}

struct Routine {
    id: RoutineId,
    state: AtomicU8,
    future: Mutex<Option<Pin<Box<dyn Future<Output = ()> + Send>>>>,
    completion: Mutex<Completion>,
    completed: Condvar,
    scheduler: Arc<SchedulerCore>,
}

struct Completion {
    done: bool,
    wakers: Vec<Waker>,
}

impl Routine {
    /// Marks a suspended routine runnable. Safe to call from any thread; a
    /// call racing the routine's own suspension parks the wakeup in
    /// `PendingSuspend`.
    fn resume(routine: &Arc<Self>) {
        loop {
            match routine.state.load(Ordering::Acquire) {
                SUSPENDED => {
                    if routine
                        .state
                        .compare_exchange(
                            SUSPENDED,
                            PENDING,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        routine.scheduler.enqueue(Arc::clone(routine));
                        return;
                    }
                }
                RUNNING => {
                    if routine
                        .state
                        .compare_exchange(
                            RUNNING,
                            PENDING_SUSPEND,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        return;
                    }
                }
                PENDING | PENDING_SUSPEND | COMPLETE => return,
                state => unreachable!("routine in invalid state {state}"),
            }
        }
    }

    fn complete(&self) {
        self.state.store(COMPLETE, Ordering::Release);
        let wakers = {
            let mut completion = self.completion.lock().expect("completion lock");
            completion.done = true;
            std::mem::take(&mut completion.wakers)
        };
        self.completed.notify_all();
        for waker in wakers {
            waker.wake();
        }
        self.scheduler.routine_finished();
    }
}

impl Wake for Routine {
    fn wake(self: Arc<Self>) {
        Routine::resume(&self);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        Routine::resume(self);
    }
}

struct SchedulerCore {
    ready: Mutex<VecDeque<Arc<Routine>>>,
    ready_signal: Condvar,
    outstanding: Mutex<usize>,
    idle_signal: Condvar,
    shutdown: AtomicBool,
    next_id: AtomicU64,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl SchedulerCore {
    fn enqueue(&self, routine: Arc<Routine>) {
        let mut ready = self.ready.lock().expect("ready lock");
        ready.push_back(routine);
        drop(ready);
        self.ready_signal.notify_one();
    }

    fn routine_finished(&self) {
        let mut outstanding = self.outstanding.lock().expect("outstanding lock");
        *outstanding -= 1;
        if *outstanding == 0 {
            self.idle_signal.notify_all();
        }
    }

    fn next_ready(&self) -> Option<Arc<Routine>> {
        let mut ready = self.ready.lock().expect("ready lock");
        loop {
            if let Some(routine) = ready.pop_front() {
                return Some(routine);
            }
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            ready = self
                .ready_signal
                .wait(ready)
                .expect("ready signal wait");
        }
    }

    fn run_worker(&self) {
        while let Some(routine) = self.next_ready() {
            self.poll_routine(routine);
        }
    }

    fn poll_routine(&self, routine: Arc<Routine>) {
        routine.state.store(RUNNING, Ordering::Release);
        let waker = Waker::from(Arc::clone(&routine));
        let mut cx = Context::from_waker(&waker);
        CURRENT.with(|current| current.set(Some(routine.id)));
        let mut slot = routine.future.lock().expect("future lock");
        let poll = match slot.as_mut() {
            Some(future) => {
                panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)))
            }
            None => Ok(Poll::Ready(())),
        };
        CURRENT.with(|current| current.set(None));
        match poll {
            Ok(Poll::Ready(())) => {
                *slot = None;
                drop(slot);
                routine.complete();
            }
            Err(_) => {
                error!("routine {} panicked and was reaped", routine.id);
                *slot = None;
                drop(slot);
                routine.complete();
            }
            Ok(Poll::Pending) => {
                drop(slot);
                if routine
                    .state
                    .compare_exchange(
                        RUNNING,
                        SUSPENDED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_err()
                {
                    // A resume landed while the routine was still on this
                    // worker; the suspension becomes a yield.
                    routine.state.store(PENDING, Ordering::Release);
                    self.enqueue(routine);
                }
            }
        }
    }
}

/// A cheap, cloneable handle to a fixed pool of worker threads and their
/// shared FIFO ready queue.
///
/// The scheduler does not stop on drop; call [`Scheduler::shutdown`] (or let
/// the owning [`crate::runtime::Runtime`] do it) to join the workers.
#[derive(Clone)]
pub struct Scheduler {
    core: Arc<SchedulerCore>,
}

impl Scheduler {
    /// Starts a scheduler with the given number of worker threads.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let core = Arc::new(SchedulerCore {
            ready: Mutex::new(VecDeque::new()),
            ready_signal: Condvar::new(),
            outstanding: Mutex::new(0),
            idle_signal: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            workers: Mutex::new(Vec::new()),
        });
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let worker_core = Arc::clone(&core);
            let handle = thread::Builder::new()
                .name(format!("girder-worker-{index}"))
                .spawn(move || worker_core.run_worker())
                .expect("spawn worker thread");
            workers.push(handle);
        }
        *core.workers.lock().expect("workers lock") = workers;
        debug!("scheduler started with {worker_count} workers");
        Self { core }
    }

    /// Registers a routine; it will eventually run on some worker.
    pub fn spawn<F>(&self, future: F) -> JoinHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.core.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut outstanding = self.core.outstanding.lock().expect("outstanding lock");
            *outstanding += 1;
        }
        let routine = Arc::new(Routine {
            id,
            state: AtomicU8::new(PENDING),
            future: Mutex::new(Some(Box::pin(future))),
            completion: Mutex::new(Completion {
                done: false,
                wakers: Vec::new(),
            }),
            completed: Condvar::new(),
            scheduler: Arc::clone(&self.core),
        });
        self.core.enqueue(Arc::clone(&routine));
        JoinHandle { routine }
    }

    /// Blocks the calling OS thread until no routines remain outstanding.
    pub fn wait_until_idle(&self) {
        let mut outstanding = self.core.outstanding.lock().expect("outstanding lock");
        while *outstanding > 0 {
            outstanding = self
                .core
                .idle_signal
                .wait(outstanding)
                .expect("idle signal wait");
        }
    }

    /// Stops the workers once the ready queue drains. Suspended routines are
    /// abandoned; close the resources they wait on first for an orderly
    /// shutdown.
    pub fn shutdown(&self) {
        self.core.shutdown.store(true, Ordering::Release);
        self.core.ready_signal.notify_all();
        let workers = std::mem::take(&mut *self.core.workers.lock().expect("workers lock"));
        for worker in workers {
            let _ = worker.join();
        }
    }
}

/// Tracks a spawned routine's completion.
pub struct JoinHandle {
    routine: Arc<Routine>,
}

impl JoinHandle {
    pub fn id(&self) -> RoutineId {
        self.routine.id
    }

    pub fn is_complete(&self) -> bool {
        self.routine.state.load(Ordering::Acquire) == COMPLETE
    }

    /// Blocks the calling OS thread until the routine completes. Must not be
    /// called from inside a routine; use [`JoinHandle::join`] there.
    pub fn wait(&self) {
        let mut completion = self.routine.completion.lock().expect("completion lock");
        while !completion.done {
            completion = self
                .routine
                .completed
                .wait(completion)
                .expect("completed wait");
        }
    }

    /// Suspends the current routine until the joined routine completes.
    pub fn join(&self) -> Join<'_> {
        Join { handle: self }
    }
}

pub struct Join<'a> {
    handle: &'a JoinHandle,
}

impl Future for Join<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut completion = self
            .handle
            .routine
            .completion
            .lock()
            .expect("completion lock");
        if completion.done {
            return Poll::Ready(());
        }
        if !completion
            .wakers
            .iter()
            .any(|waker| waker.will_wake(cx.waker()))
        {
            completion.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

/// Requeues the current routine at the back of the ready queue.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

struct ThreadWaker {
    thread: thread::Thread,
}

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.thread.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.thread.unpark();
    }
}

/// Runs a future to completion on the calling OS thread.
///
/// This is the bridge for code that is not inside a routine: the thread
/// blocks (parks) instead of yielding. Calling it from inside a routine
/// would block a worker and is a usage error.
pub fn block_on<F: Future>(future: F) -> F::Output {
    debug_assert!(
        !is_inside_routine(),
        "block_on called from inside a routine"
    );
    let waker = Waker::from(Arc::new(ThreadWaker {
        thread: thread::current(),
    }));
    let mut cx = Context::from_waker(&waker);
    let mut future = std::pin::pin!(future);
    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(value) => return value,
            Poll::Pending => thread::park(),
        }
    }
}
