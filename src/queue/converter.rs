//! Adapters applying a pure function on pop or push.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::queue::queue::Queue;
use crate::queue::{QueueReader, QueueWriter};

/// Converts every popped value with a function.
pub struct ConverterQueueReader<S: Send + 'static, T: Send + 'static> {
    source: Arc<dyn QueueReader<S>>,
    convert: Box<dyn Fn(S) -> T + Send + Sync>,
}

impl<S: Send + 'static, T: Send + 'static> ConverterQueueReader<S, T> {
    pub fn new<F>(source: Arc<dyn QueueReader<S>>, convert: F) -> Self
    where
        F: Fn(S) -> T + Send + Sync + 'static,
    {
        Self {
            source,
            convert: Box::new(convert),
        }
    }
}

#[async_trait]
impl<S: Send + 'static, T: Send + 'static> QueueReader<T> for ConverterQueueReader<S, T> {
    fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    fn try_pop(&self) -> Option<T> {
        self.source.try_pop().map(&self.convert)
    }

    async fn pop(&self) -> Result<T> {
        Ok((self.convert)(self.source.pop().await?))
    }

    fn break_with(&self, cause: Option<Arc<Error>>) {
        self.source.break_with(cause);
    }
}

/// Converts every pushed value with a function before forwarding it.
pub struct ConverterQueueWriter<S: Send + 'static, T: Send + 'static> {
    target: Arc<dyn QueueWriter<T>>,
    convert: Box<dyn Fn(S) -> T + Send + Sync>,
}

impl<S: Send + 'static, T: Send + 'static> ConverterQueueWriter<S, T> {
    pub fn new<F>(target: Arc<dyn QueueWriter<T>>, convert: F) -> Self
    where
        F: Fn(S) -> T + Send + Sync + 'static,
    {
        Self {
            target,
            convert: Box::new(convert),
        }
    }
}

#[async_trait]
impl<S: Send + 'static, T: Send + 'static> QueueWriter<S> for ConverterQueueWriter<S, T> {
    fn try_push(&self, value: S) -> Result<()> {
        self.target.try_push((self.convert)(value))
    }

    async fn push(&self, value: S) {
        self.target.push((self.convert)(value)).await;
    }

    fn is_broken(&self) -> bool {
        self.target.is_broken()
    }

    fn break_with(&self, cause: Option<Arc<Error>>) {
        self.target.break_with(cause);
    }
}

/// A deferred unit of work produced by [`task_queue_writer`].
pub type Task = Box<dyn FnOnce() + Send>;

/// Bundles every value pushed through the returned writer with `handler`
/// into a [`Task`] on `tasks`. Drain the task queue from a dedicated
/// routine:
///
/// ```ignore
/// let tasks = Queue::new();
/// scheduler.spawn({
///     let tasks = tasks.clone();
///     async move {
///         while let Ok(task) = tasks.pop().await {
///             task();
///         }
///     }
/// });
/// let updates = task_queue_writer(&tasks, |value: u64| process(value));
/// ```
pub fn task_queue_writer<T, F>(
    tasks: &Arc<Queue<Task>>,
    handler: F,
) -> ConverterQueueWriter<T, Task>
where
    T: Send + 'static,
    F: Fn(T) + Clone + Send + Sync + 'static,
{
    let tasks: Arc<dyn QueueWriter<Task>> = Arc::clone(tasks) as _;
    ConverterQueueWriter::new(tasks, move |value| {
        let handler = handler.clone();
        Box::new(move || handler(value)) as Task
    })
}
