//! Queues and fan-out for cross-routine communication.
//!
//! A queue carries values from a push side to a pop side. Pop suspends the
//! current routine while the queue is empty; once the queue is *broken* the
//! remaining values drain first and only then does pop report
//! [`Error::PipeBroken`] with the stored cause. The two sides are expressed
//! as the [`QueueReader`] and [`QueueWriter`] traits so adapters (converters,
//! aggregates, publishers) compose over any implementation.

pub mod aggregate;
pub mod converter;
pub mod publisher;
#[allow(clippy::module_inception)]
pub mod queue;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::sync::waitable::Waitable;

/// The pop side of a queue.
#[async_trait]
pub trait QueueReader<T: Send + 'static>: Send + Sync {
    /// Whether no value is currently buffered.
    fn is_empty(&self) -> bool;

    /// Removes the head without suspending.
    fn try_pop(&self) -> Option<T>;

    /// Removes the head, suspending the current routine while the queue is
    /// empty. After a break the FIFO drains before `PipeBroken` surfaces.
    async fn pop(&self) -> Result<T>;

    /// Breaks the queue with an optional cause.
    fn break_with(&self, cause: Option<Arc<Error>>);

    /// Breaks the queue with no cause.
    fn close(&self) {
        self.break_with(None);
    }
}

/// The push side of a queue.
#[async_trait]
pub trait QueueWriter<T: Send + 'static>: Send + Sync {
    /// Appends a value without suspending. A bounded queue that is full
    /// reports [`Error::QueueFull`]; a broken queue silently drops the
    /// value.
    fn try_push(&self, value: T) -> Result<()>;

    /// Appends a value, suspending the current routine while a bounded queue
    /// is full. Push is total: a broken queue silently drops the value.
    /// Fan-outs that need to notice a dead queue ask [`QueueWriter::is_broken`].
    async fn push(&self, value: T);

    /// Whether the queue has been broken.
    fn is_broken(&self) -> bool;

    /// Breaks the queue with an optional cause.
    fn break_with(&self, cause: Option<Arc<Error>>);

    /// Breaks the queue with no cause.
    fn close(&self) {
        self.break_with(None);
    }
}

/// A pop side that can also take part in [`crate::sync::wait_any`]
/// selection.
pub trait WaitableQueueReader<T: Send + 'static>: QueueReader<T> + Waitable {}

impl<T: Send + 'static, Q: QueueReader<T> + Waitable + ?Sized> WaitableQueueReader<T> for Q {}

/// Owning handle over a pop side that breaks the queue when dropped, so a
/// discarded consumer never strands its producers.
pub struct ScopedQueueReader<T: Send + 'static> {
    reader: Option<Arc<dyn QueueReader<T>>>,
}

impl<T: Send + 'static> ScopedQueueReader<T> {
    pub fn new(reader: Arc<dyn QueueReader<T>>) -> Self {
        Self {
            reader: Some(reader),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.get().is_empty()
    }

    pub fn try_pop(&self) -> Option<T> {
        self.get().try_pop()
    }

    pub async fn pop(&self) -> Result<T> {
        self.get().pop().await
    }

    /// Releases the underlying reader without breaking it.
    pub fn release(mut self) -> Arc<dyn QueueReader<T>> {
        self.reader.take().expect("reader released twice")
    }

    fn get(&self) -> &Arc<dyn QueueReader<T>> {
        self.reader.as_ref().expect("reader released")
    }
}

impl<T: Send + 'static> Drop for ScopedQueueReader<T> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.close();
        }
    }
}

impl<T: Send + 'static> From<Arc<dyn QueueReader<T>>> for ScopedQueueReader<T> {
    fn from(reader: Arc<dyn QueueReader<T>>) -> Self {
        Self::new(reader)
    }
}

/// Owning handle over a push side that breaks the queue when dropped, so a
/// discarded producer never strands its consumers.
pub struct ScopedQueueWriter<T: Send + 'static> {
    writer: Option<Arc<dyn QueueWriter<T>>>,
}

impl<T: Send + 'static> ScopedQueueWriter<T> {
    pub fn new(writer: Arc<dyn QueueWriter<T>>) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    pub fn try_push(&self, value: T) -> Result<()> {
        self.get().try_push(value)
    }

    pub async fn push(&self, value: T) {
        self.get().push(value).await;
    }

    /// Releases the underlying writer without breaking it.
    pub fn release(mut self) -> Arc<dyn QueueWriter<T>> {
        self.writer.take().expect("writer released twice")
    }

    fn get(&self) -> &Arc<dyn QueueWriter<T>> {
        self.writer.as_ref().expect("writer released")
    }
}

impl<T: Send + 'static> Drop for ScopedQueueWriter<T> {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.close();
        }
    }
}

impl<T: Send + 'static> From<Arc<dyn QueueWriter<T>>> for ScopedQueueWriter<T> {
    fn from(writer: Arc<dyn QueueWriter<T>>) -> Self {
        Self::new(writer)
    }
}

pub use aggregate::AggregateQueueReader;
pub use converter::{task_queue_writer, ConverterQueueReader, ConverterQueueWriter, Task};
pub use publisher::Publisher;
pub use queue::Queue;
