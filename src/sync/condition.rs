//! A condition variable whose waiters are routines.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::routine::suspended::{SuspendedRoutineNode, SuspendedRoutineQueue};
use crate::sync::mutex::{LockFuture, Mutex, MutexGuard};
use crate::sync::spin::SpinMutex;

/// Suspension-aware condition variable.
///
/// `wait` consumes the guard of the mutex protecting the predicate, enrolls
/// the routine, releases the mutex, and re-acquires it before handing the
/// guard back:
///
/// ```ignore
/// let mut guard = state.lock().await;
/// while !guard.ready {
///     guard = condition.wait(guard).await;
/// }
/// ```
pub struct ConditionVariable {
    waiters: SpinMutex<SuspendedRoutineQueue>,
}

impl ConditionVariable {
    pub fn new() -> Self {
        Self {
            waiters: SpinMutex::new(SuspendedRoutineQueue::new()),
        }
    }

    /// Resumes the first waiting routine.
    pub fn notify_one(&self) {
        self.waiters.lock().resume_front();
    }

    /// Resumes every waiting routine in FIFO order.
    pub fn notify_all(&self) {
        self.waiters.lock().resume_all();
    }

    /// Releases the guard, suspends until notified, then re-acquires the
    /// mutex. Always re-check the predicate on return.
    pub fn wait<'m, 'c, T: ?Sized>(
        &'c self,
        guard: MutexGuard<'m, T>,
    ) -> Wait<'m, 'c, T> {
        Wait {
            state: WaitState::Start {
                condition: self,
                guard: Some(guard),
            },
        }
    }
}

impl Default for ConditionVariable {
    fn default() -> Self {
        Self::new()
    }
}

enum WaitState<'m, 'c, T: ?Sized> {
    Start {
        condition: &'c ConditionVariable,
        guard: Option<MutexGuard<'m, T>>,
    },
    Suspended {
        condition: &'c ConditionVariable,
        mutex: &'m Mutex<T>,
        node: Arc<SuspendedRoutineNode>,
    },
    Relock {
        future: LockFuture<'m, T>,
    },
    Done,
}

pub struct Wait<'m, 'c, T: ?Sized> {
    state: WaitState<'m, 'c, T>,
}

impl<'m, T: ?Sized> Future for Wait<'m, '_, T> {
    type Output = MutexGuard<'m, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<MutexGuard<'m, T>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                WaitState::Start { condition, guard } => {
                    let guard = guard.take().expect("wait polled without guard");
                    let mutex = guard.mutex();
                    // Enroll before releasing the predicate lock so a notify
                    // issued right after the release is not lost.
                    let node = condition.waiters.lock().suspend((), cx);
                    let condition = *condition;
                    drop(guard);
                    this.state = WaitState::Suspended {
                        condition,
                        mutex,
                        node,
                    };
                    return Poll::Pending;
                }
                WaitState::Suspended { mutex, node, .. } => {
                    if !node.park(cx) {
                        return Poll::Pending;
                    }
                    let mutex = *mutex;
                    this.state = WaitState::Relock {
                        future: mutex.lock(),
                    };
                }
                WaitState::Relock { future } => {
                    return match Pin::new(future).poll(cx) {
                        Poll::Ready(guard) => {
                            this.state = WaitState::Done;
                            Poll::Ready(guard)
                        }
                        Poll::Pending => Poll::Pending,
                    };
                }
                WaitState::Done => unreachable!("wait polled after completion"),
            }
        }
    }
}

impl<T: ?Sized> Drop for Wait<'_, '_, T> {
    fn drop(&mut self) {
        if let WaitState::Suspended {
            condition, node, ..
        } = &self.state
        {
            let mut waiters = condition.waiters.lock();
            if !waiters.remove(node) && node.is_resumed() {
                // The notification we consumed goes to the next waiter.
                waiters.resume_front();
            }
        }
    }
}
