//! Combines multiple queue readers into one.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::queue::{QueueReader, WaitableQueueReader};
use crate::sync::waitable::{wait_any, AvailabilityToken, Waitable};

/// Reads from N source queues as if they were one.
///
/// `pop` selects the first source to become available and forwards one
/// element. Breaking the aggregate breaks every source; once every source is
/// broken and drained the aggregate itself reports `PipeBroken`.
pub struct AggregateQueueReader<T: Send + 'static> {
    queues: Vec<Arc<dyn WaitableQueueReader<T>>>,
}

impl<T: Send + 'static> AggregateQueueReader<T> {
    pub fn new(queues: Vec<Arc<dyn WaitableQueueReader<T>>>) -> Self {
        Self { queues }
    }

    pub fn source_count(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|queue| queue.is_empty())
    }

    pub fn try_pop(&self) -> Option<T> {
        self.queues.iter().find_map(|queue| queue.try_pop())
    }

    pub async fn pop(&self) -> Result<T> {
        loop {
            if let Some(value) = self.try_pop() {
                return Ok(value);
            }
            // A source that is empty yet available has terminated, since
            // availability means non-empty or broken. Wait only on the rest;
            // with none left the aggregate itself is broken.
            let live: Vec<&dyn Waitable> = self
                .queues
                .iter()
                .filter(|queue| !(queue.is_empty() && queue.is_available()))
                .map(|queue| queue.as_ref() as &dyn Waitable)
                .collect();
            if live.is_empty() {
                return Err(Error::PipeBroken(None));
            }
            wait_any(&live).await;
        }
    }

    pub fn break_with(&self, cause: Option<Arc<Error>>) {
        for queue in &self.queues {
            queue.break_with(cause.clone());
        }
    }

    pub fn close(&self) {
        self.break_with(None);
    }
}

#[async_trait]
impl<T: Send + 'static> QueueReader<T> for AggregateQueueReader<T> {
    fn is_empty(&self) -> bool {
        AggregateQueueReader::is_empty(self)
    }

    fn try_pop(&self) -> Option<T> {
        AggregateQueueReader::try_pop(self)
    }

    async fn pop(&self) -> Result<T> {
        AggregateQueueReader::pop(self).await
    }

    fn break_with(&self, cause: Option<Arc<Error>>) {
        AggregateQueueReader::break_with(self, cause)
    }
}

impl<T: Send + 'static> Waitable for AggregateQueueReader<T> {
    fn is_available(&self) -> bool {
        self.queues.iter().any(|queue| queue.is_available())
    }

    fn watch(&self, token: &Arc<AvailabilityToken>) {
        for queue in &self.queues {
            queue.watch(token);
        }
    }
}

impl<T: Send + 'static> Drop for AggregateQueueReader<T> {
    fn drop(&mut self) {
        self.close();
    }
}
