//! Fair, suspension-aware mutexes.
//!
//! Acquisition suspends the current routine instead of blocking the worker
//! thread. Waiters are woken strictly FIFO; an unlock with waiters present
//! hands the lock directly to the head, so the lock is never observed free
//! while anyone queues for it.

use std::cell::UnsafeCell;
use std::future::Future;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::routine::scheduler::{execution_id, ExecutionId};
use crate::routine::suspended::{SuspendedRoutineNode, SuspendedRoutineQueue};
use crate::sync::spin::SpinMutex;

struct MutexState {
    locked: bool,
    waiters: SuspendedRoutineQueue,
}

/// A fair mutex protecting `T`. `lock` suspends the current routine.
pub struct Mutex<T: ?Sized> {
    state: SpinMutex<MutexState>,
    value: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: SpinMutex::new(MutexState {
                locked: false,
                waiters: SuspendedRoutineQueue::new(),
            }),
            value: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Acquires the mutex, suspending the current routine while it is held
    /// elsewhere. Waiters acquire in FIFO order.
    pub fn lock(&self) -> LockFuture<'_, T> {
        LockFuture {
            mutex: self,
            node: None,
        }
    }

    /// Acquires the mutex only if it is free right now.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let mut state = self.state.lock();
        if state.locked {
            None
        } else {
            state.locked = true;
            Some(MutexGuard {
                mutex: self,
                _marker: PhantomData,
            })
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    fn unlock(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.locked, "unlock of an unlocked mutex");
        // Hand the lock to the FIFO head; it stays held through the transfer.
        if !state.waiters.resume_front() {
            state.locked = false;
        }
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct LockFuture<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
    node: Option<Arc<SuspendedRoutineNode>>,
}

impl<'a, T: ?Sized> Future for LockFuture<'a, T> {
    type Output = MutexGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<MutexGuard<'a, T>> {
        let this = self.get_mut();
        if let Some(node) = &this.node {
            if !node.park(cx) {
                return Poll::Pending;
            }
            // The unlocker handed the lock over without releasing it.
            this.node = None;
            return Poll::Ready(MutexGuard {
                mutex: this.mutex,
                _marker: PhantomData,
            });
        }
        let mut state = this.mutex.state.lock();
        if !state.locked {
            state.locked = true;
            return Poll::Ready(MutexGuard {
                mutex: this.mutex,
                _marker: PhantomData,
            });
        }
        this.node = Some(state.waiters.suspend((), cx));
        Poll::Pending
    }
}

impl<T: ?Sized> Drop for LockFuture<'_, T> {
    fn drop(&mut self) {
        if let Some(node) = self.node.take() {
            let mut state = self.mutex.state.lock();
            if !state.waiters.remove(&node) && node.is_resumed() {
                // Granted but abandoned; pass the lock on.
                if !state.waiters.resume_front() {
                    state.locked = false;
                }
            }
        }
    }
}

pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
    _marker: PhantomData<&'a mut T>,
}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    pub(crate) fn mutex(&self) -> &'a Mutex<T> {
        self.mutex
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

struct RecursiveState {
    owner: Option<ExecutionId>,
    depth: usize,
    waiters: SuspendedRoutineQueue<ExecutionId>,
}

/// A fair mutex that the owning routine may re-acquire.
///
/// Unlike [`Mutex`] this is a pure lock (it protects a critical section, not
/// a value): recursive acquisition cannot soundly hand out a second
/// exclusive reference.
pub struct RecursiveMutex {
    state: SpinMutex<RecursiveState>,
}

impl RecursiveMutex {
    pub fn new() -> Self {
        Self {
            state: SpinMutex::new(RecursiveState {
                owner: None,
                depth: 0,
                waiters: SuspendedRoutineQueue::new(),
            }),
        }
    }

    pub fn lock(&self) -> RecursiveLockFuture<'_> {
        RecursiveLockFuture {
            mutex: self,
            node: None,
        }
    }

    pub fn try_lock(&self) -> Option<RecursiveMutexGuard<'_>> {
        let caller = execution_id();
        let mut state = self.state.lock();
        match state.owner {
            None => {
                state.owner = Some(caller);
                state.depth = 1;
                Some(RecursiveMutexGuard { mutex: self })
            }
            Some(owner) if owner == caller => {
                state.depth += 1;
                Some(RecursiveMutexGuard { mutex: self })
            }
            Some(_) => None,
        }
    }

    fn unlock(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.depth > 0, "unlock of an unlocked recursive mutex");
        state.depth -= 1;
        if state.depth == 0 {
            self.release_to_next(&mut state);
        }
    }

    fn release_to_next(&self, state: &mut RecursiveState) {
        // Transfer ownership to the FIFO head, keyed by its execution id.
        match state.waiters.front_key() {
            Some(owner) => {
                state.owner = Some(owner);
                state.depth = 1;
                state.waiters.resume_front();
            }
            None => {
                state.owner = None;
            }
        }
    }
}

impl Default for RecursiveMutex {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RecursiveLockFuture<'a> {
    mutex: &'a RecursiveMutex,
    node: Option<Arc<SuspendedRoutineNode<ExecutionId>>>,
}

impl<'a> Future for RecursiveLockFuture<'a> {
    type Output = RecursiveMutexGuard<'a>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<RecursiveMutexGuard<'a>> {
        let this = self.get_mut();
        if let Some(node) = &this.node {
            if !node.park(cx) {
                return Poll::Pending;
            }
            this.node = None;
            return Poll::Ready(RecursiveMutexGuard { mutex: this.mutex });
        }
        let caller = execution_id();
        let mut state = this.mutex.state.lock();
        match state.owner {
            None => {
                state.owner = Some(caller);
                state.depth = 1;
                Poll::Ready(RecursiveMutexGuard { mutex: this.mutex })
            }
            Some(owner) if owner == caller => {
                state.depth += 1;
                Poll::Ready(RecursiveMutexGuard { mutex: this.mutex })
            }
            Some(_) => {
                this.node = Some(state.waiters.suspend(caller, cx));
                Poll::Pending
            }
        }
    }
}

impl Drop for RecursiveLockFuture<'_> {
    fn drop(&mut self) {
        if let Some(node) = self.node.take() {
            let mut state = self.mutex.state.lock();
            if !state.waiters.remove(&node) && node.is_resumed() {
                state.depth = 0;
                self.mutex.release_to_next(&mut state);
            }
        }
    }
}

pub struct RecursiveMutexGuard<'a> {
    mutex: &'a RecursiveMutex,
}

impl Drop for RecursiveMutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
