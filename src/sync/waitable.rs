//! Awaitable availability.
//!
//! A [`Waitable`] is any object whose readiness can be awaited: a queue with
//! an element, a timer that has left its pending state. Each one embeds a
//! [`WaitableCore`] holding its suspended waiters plus the availability
//! tokens of multi-waiters; [`wait_any`] selects the first of several
//! waitables to become available, which is how aggregate queue readers and
//! timeout compositions are built.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

use crate::routine::suspended::{SuspendedRoutineNode, SuspendedRoutineQueue};
use crate::sync::spin::SpinMutex;

/// Links a multi-waiter to every object it selects over. Whichever object
/// becomes available signals the token and the selector re-scans.
pub struct AvailabilityToken {
    waker: SpinMutex<Option<Waker>>,
}

impl AvailabilityToken {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            waker: SpinMutex::new(None),
        })
    }

    /// Wakes the selector holding this token, if any.
    pub fn signal(&self) {
        let waker = self.waker.lock().take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn update(&self, cx: &Context<'_>) {
        let mut slot = self.waker.lock();
        match slot.as_mut() {
            Some(waker) if waker.will_wake(cx.waker()) => {}
            _ => *slot = Some(cx.waker().clone()),
        }
    }
}

struct CoreInner {
    waiters: SuspendedRoutineQueue,
    tokens: Vec<Weak<AvailabilityToken>>,
}

/// The waiter bookkeeping shared by every waitable object: a FIFO of
/// suspended routines and the availability tokens of selectors.
///
/// Notification discipline: the owning object changes its predicate under its
/// own lock and then notifies; waiters re-check the predicate after enrolling
/// so the window between a failed check and the enroll cannot lose a wakeup.
pub struct WaitableCore {
    inner: SpinMutex<CoreInner>,
}

impl WaitableCore {
    pub fn new() -> Self {
        Self {
            inner: SpinMutex::new(CoreInner {
                waiters: SuspendedRoutineQueue::new(),
                tokens: Vec::new(),
            }),
        }
    }

    /// Resumes the first suspended waiter and signals every token.
    pub fn notify_one(&self) {
        let mut inner = self.inner.lock();
        inner.waiters.resume_front();
        Self::signal_tokens(&mut inner);
    }

    /// Resumes all suspended waiters and signals every token.
    pub fn notify_all(&self) {
        let mut inner = self.inner.lock();
        inner.waiters.resume_all();
        Self::signal_tokens(&mut inner);
    }

    fn signal_tokens(inner: &mut CoreInner) {
        inner.tokens.retain(|token| match token.upgrade() {
            Some(token) => {
                token.signal();
                true
            }
            None => false,
        });
    }

    /// Adds a selector's availability token; it is signalled on every
    /// notify until the selector drops it.
    pub fn register_token(&self, token: &Arc<AvailabilityToken>) {
        let mut inner = self.inner.lock();
        inner.tokens.retain(|entry| entry.strong_count() > 0);
        inner.tokens.push(Arc::downgrade(token));
    }

    /// Suspends the current routine until `attempt` yields a value.
    ///
    /// `attempt` is the predicate-plus-acquire step; it runs under whatever
    /// lock it takes itself. The future enrolls a waiter, re-runs `attempt`
    /// to close the notify window, and parks. A future dropped after its
    /// waiter was resumed passes the notification on.
    pub fn wait_until<F, T>(&self, attempt: F) -> WaitUntil<'_, F, T>
    where
        F: FnMut() -> Option<T>,
    {
        WaitUntil {
            core: self,
            attempt,
            node: None,
            _marker: PhantomData,
        }
    }
}

impl Default for WaitableCore {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WaitUntil<'a, F, T> {
    core: &'a WaitableCore,
    attempt: F,
    node: Option<Arc<SuspendedRoutineNode>>,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> Future for WaitUntil<'_, F, T>
where
    F: FnMut() -> Option<T> + Unpin,
{
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        if let Some(node) = &this.node {
            if !node.park(cx) {
                return Poll::Pending;
            }
            this.node = None;
        }
        if let Some(value) = (this.attempt)() {
            return Poll::Ready(value);
        }
        let node = this.core.inner.lock().waiters.suspend((), cx);
        if let Some(value) = (this.attempt)() {
            let mut inner = this.core.inner.lock();
            if !inner.waiters.remove(&node) && node.is_resumed() {
                // The notification this node consumed belongs to someone else.
                inner.waiters.resume_front();
            }
            return Poll::Ready(value);
        }
        this.node = Some(node);
        Poll::Pending
    }
}

impl<F, T> Drop for WaitUntil<'_, F, T> {
    fn drop(&mut self) {
        if let Some(node) = self.node.take() {
            let mut inner = self.core.inner.lock();
            if !inner.waiters.remove(&node) && node.is_resumed() {
                inner.waiters.resume_front();
            }
        }
    }
}

/// An object whose availability can be awaited.
///
/// Composite objects (an aggregate of queues) forward `watch` to every
/// constituent, so one token observes them all.
pub trait Waitable: Send + Sync {
    /// Whether a wait on this object would complete without suspending.
    fn is_available(&self) -> bool;

    /// Registers a selector's availability token.
    fn watch(&self, token: &Arc<AvailabilityToken>);
}

/// Suspends the current routine until the object is available.
pub async fn wait(waitable: &dyn Waitable) {
    wait_any(std::slice::from_ref(&waitable)).await;
}

/// Suspends the current routine until one of the objects is available and
/// returns its index. Ties go to the earliest index.
pub fn wait_any<'a>(waitables: &'a [&'a dyn Waitable]) -> WaitAny<'a> {
    WaitAny {
        waitables,
        token: None,
    }
}

pub struct WaitAny<'a> {
    waitables: &'a [&'a dyn Waitable],
    token: Option<Arc<AvailabilityToken>>,
}

impl Future for WaitAny<'_> {
    type Output = usize;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<usize> {
        let this = self.get_mut();
        if let Some(index) = Self::first_available(this.waitables) {
            return Poll::Ready(index);
        }
        if this.token.is_none() {
            let token = AvailabilityToken::new();
            for waitable in this.waitables {
                waitable.watch(&token);
            }
            this.token = Some(token);
            // An object may have become available while tokens were being
            // registered; re-scan before parking.
            if let Some(index) = Self::first_available(this.waitables) {
                return Poll::Ready(index);
            }
        }
        if let Some(token) = &this.token {
            token.update(cx);
        }
        if let Some(index) = Self::first_available(this.waitables) {
            return Poll::Ready(index);
        }
        Poll::Pending
    }
}

impl WaitAny<'_> {
    fn first_available(waitables: &[&dyn Waitable]) -> Option<usize> {
        waitables
            .iter()
            .position(|waitable| waitable.is_available())
    }
}
