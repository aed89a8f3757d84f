//! The concrete FIFO queue.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::queue::{QueueReader, QueueWriter};
use crate::sync::spin::SpinMutex;
use crate::sync::waitable::{AvailabilityToken, Waitable, WaitableCore};

struct QueueState<T> {
    items: VecDeque<T>,
    broken: bool,
    cause: Option<Arc<Error>>,
}

/// A multi-producer, multi-consumer FIFO of `T`.
///
/// Unbounded by default; [`Queue::with_capacity`] bounds it, which makes
/// `push` suspend producers while the queue is full. Values pushed from a
/// single producer pop in push order; pushes from multiple producers are
/// ordered by completion of the internal critical section.
///
/// Shared by `Arc`, which also serves as the [`QueueReader`]/[`QueueWriter`]
/// trait object for adapters.
pub struct Queue<T> {
    state: SpinMutex<QueueState<T>>,
    consumers: WaitableCore,
    producers: WaitableCore,
    capacity: Option<usize>,
}

impl<T: Send + 'static> Queue<T> {
    /// Creates an unbounded queue.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// Creates a queue holding at most `capacity` values.
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self::build(Some(capacity.max(1))))
    }

    fn build(capacity: Option<usize>) -> Self {
        Self {
            state: SpinMutex::new(QueueState {
                items: VecDeque::new(),
                broken: false,
                cause: None,
            }),
            consumers: WaitableCore::new(),
            producers: WaitableCore::new(),
            capacity,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_broken(&self) -> bool {
        self.state.lock().broken
    }

    /// Removes the head without suspending.
    pub fn try_pop(&self) -> Option<T> {
        let value = self.state.lock().items.pop_front();
        if value.is_some() {
            self.producers.notify_one();
        }
        value
    }

    /// Removes the head, suspending while the queue is empty. After a break
    /// the buffered values drain before `PipeBroken` surfaces.
    pub async fn pop(&self) -> Result<T> {
        self.consumers
            .wait_until(|| {
                let mut state = self.state.lock();
                if let Some(value) = state.items.pop_front() {
                    drop(state);
                    self.producers.notify_one();
                    return Some(Ok(value));
                }
                if state.broken {
                    return Some(Err(Error::PipeBroken(state.cause.clone())));
                }
                None
            })
            .await
    }

    /// Appends a value without suspending. A broken queue silently drops
    /// it; a full bounded queue reports [`Error::QueueFull`].
    pub fn try_push(&self, value: T) -> Result<()> {
        let mut state = self.state.lock();
        if state.broken {
            return Ok(());
        }
        if let Some(capacity) = self.capacity {
            if state.items.len() >= capacity {
                return Err(Error::QueueFull);
            }
        }
        state.items.push_back(value);
        drop(state);
        self.consumers.notify_one();
        Ok(())
    }

    /// Appends a value, suspending while a bounded queue is full. Push is
    /// total: a broken queue silently drops the value.
    pub async fn push(&self, value: T) {
        let mut slot = Some(value);
        self.producers
            .wait_until(|| {
                let mut state = self.state.lock();
                if state.broken {
                    slot.take();
                    return Some(());
                }
                if let Some(capacity) = self.capacity {
                    if state.items.len() >= capacity {
                        return None;
                    }
                }
                state.items.push_back(slot.take().expect("pushed value"));
                drop(state);
                self.consumers.notify_one();
                Some(())
            })
            .await
    }

    /// Breaks the queue: subsequent pushes are dropped and pops drain the
    /// FIFO before reporting `PipeBroken` with `cause`. Resumes every
    /// suspended producer and consumer. Breaking twice keeps the first
    /// cause.
    pub fn break_with(&self, cause: Option<Arc<Error>>) {
        {
            let mut state = self.state.lock();
            if state.broken {
                return;
            }
            state.broken = true;
            state.cause = cause;
        }
        self.consumers.notify_all();
        self.producers.notify_all();
    }

    /// Breaks the queue with no cause.
    pub fn close(&self) {
        self.break_with(None);
    }
}

#[async_trait]
impl<T: Send + 'static> QueueReader<T> for Queue<T> {
    fn is_empty(&self) -> bool {
        Queue::is_empty(self)
    }

    fn try_pop(&self) -> Option<T> {
        Queue::try_pop(self)
    }

    async fn pop(&self) -> Result<T> {
        Queue::pop(self).await
    }

    fn break_with(&self, cause: Option<Arc<Error>>) {
        Queue::break_with(self, cause)
    }
}

#[async_trait]
impl<T: Send + 'static> QueueWriter<T> for Queue<T> {
    fn try_push(&self, value: T) -> Result<()> {
        Queue::try_push(self, value)
    }

    async fn push(&self, value: T) {
        Queue::push(self, value).await;
    }

    fn is_broken(&self) -> bool {
        Queue::is_broken(self)
    }

    fn break_with(&self, cause: Option<Arc<Error>>) {
        Queue::break_with(self, cause)
    }
}

impl<T: Send + 'static> Waitable for Queue<T> {
    fn is_available(&self) -> bool {
        let state = self.state.lock();
        !state.items.is_empty() || state.broken
    }

    fn watch(&self, token: &Arc<AvailabilityToken>) {
        self.consumers.register_token(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routine::block_on;

    #[test]
    fn pop_returns_in_push_order() {
        let queue = Queue::new();
        for value in 0..8 {
            queue.try_push(value).expect("push");
        }
        for expected in 0..8 {
            assert_eq!(block_on(queue.pop()).expect("pop"), expected);
        }
    }

    #[test]
    fn break_drains_before_erroring() {
        let queue = Queue::new();
        queue.try_push(1).expect("push");
        queue.try_push(2).expect("push");
        queue.close();
        assert_eq!(block_on(queue.pop()).expect("pop"), 1);
        assert_eq!(block_on(queue.pop()).expect("pop"), 2);
        assert!(matches!(
            block_on(queue.pop()),
            Err(Error::PipeBroken(None))
        ));
    }

    #[test]
    fn break_with_cause_surfaces_after_drain() {
        let queue = Queue::new();
        queue.try_push(9).expect("push");
        queue.break_with(Some(Arc::new(Error::EndOfFile)));
        assert_eq!(block_on(queue.pop()).expect("pop"), 9);
        match block_on(queue.pop()) {
            Err(Error::PipeBroken(Some(cause))) => {
                assert!(cause.is_end_of_file());
            }
            other => panic!("expected broken pipe, got {other:?}"),
        }
    }

    #[test]
    fn push_after_break_is_silently_dropped() {
        let queue = Queue::new();
        queue.close();
        queue.try_push(5).expect("push is total");
        block_on(queue.push(6));
        assert!(queue.is_empty());
    }

    #[test]
    fn bounded_try_push_reports_full() {
        let queue = Queue::with_capacity(1);
        queue.try_push(1).expect("push");
        assert!(matches!(queue.try_push(2), Err(Error::QueueFull)));
        assert_eq!(queue.try_pop(), Some(1));
        queue.try_push(2).expect("push after drain");
    }
}
