//! Single-producer, many-consumer fan-out.

use std::sync::{Arc, Weak};

use log::debug;

use crate::error::Error;
use crate::queue::QueueWriter;
use crate::sync::spin::SpinMutex;

struct PublisherState<T: Send + 'static> {
    subscribers: Vec<Weak<dyn QueueWriter<T>>>,
    broken: bool,
    cause: Option<Arc<Error>>,
}

/// Fans one value out to every monitoring queue writer, in attachment order.
///
/// The publisher holds only weak references: a queue whose owner went away
/// is dropped on the next push, and one subscriber's failure never reaches
/// the others. Pushing never suspends; a bounded subscriber that is full at
/// publish time misses that value.
pub struct Publisher<T: Send + 'static> {
    state: SpinMutex<PublisherState<T>>,
}

impl<T: Clone + Send + 'static> Publisher<T> {
    pub fn new() -> Self {
        Self {
            state: SpinMutex::new(PublisherState {
                subscribers: Vec::new(),
                broken: false,
                cause: None,
            }),
        }
    }

    /// Attaches a queue writer; it receives every subsequent push until it
    /// disconnects or breaks. Monitoring a broken publisher breaks the
    /// writer immediately.
    pub fn monitor(&self, writer: Arc<dyn QueueWriter<T>>) {
        let mut state = self.state.lock();
        if state.broken {
            let cause = state.cause.clone();
            drop(state);
            writer.break_with(cause);
            return;
        }
        state.subscribers.push(Arc::downgrade(&writer));
    }

    /// Pushes one value to every live subscriber, pruning the dead and the
    /// broken.
    pub fn push(&self, value: T) {
        let mut state = self.state.lock();
        if state.broken {
            return;
        }
        state.subscribers.retain(|subscriber| {
            let Some(subscriber) = subscriber.upgrade() else {
                return false;
            };
            // Push is total, so a dead queue is detected by asking, not by
            // an error return.
            if subscriber.is_broken() {
                debug!("publisher dropping broken subscriber");
                return false;
            }
            match subscriber.try_push(value.clone()) {
                Ok(()) => true,
                Err(Error::QueueFull) => {
                    debug!("publisher skipping full subscriber");
                    true
                }
                Err(_) => {
                    debug!("publisher dropping failed subscriber");
                    false
                }
            }
        });
    }

    /// Breaks every attached queue and releases the references. Subsequent
    /// pushes are dropped.
    pub fn break_with(&self, cause: Option<Arc<Error>>) {
        let subscribers = {
            let mut state = self.state.lock();
            if state.broken {
                return;
            }
            state.broken = true;
            state.cause = cause.clone();
            std::mem::take(&mut state.subscribers)
        };
        for subscriber in subscribers {
            if let Some(subscriber) = subscriber.upgrade() {
                subscriber.break_with(cause.clone());
            }
        }
    }

    pub fn close(&self) {
        self.break_with(None);
    }

    /// The number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state
            .subscribers
            .retain(|subscriber| subscriber.strong_count() > 0);
        state.subscribers.len()
    }
}

impl<T: Clone + Send + 'static> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Publisher;
    use crate::queue::queue::Queue;
    use crate::routine::block_on;

    #[test]
    fn pushes_in_attachment_order() {
        let publisher = Publisher::new();
        let first = Queue::new();
        let second = Queue::new();
        publisher.monitor(first.clone() as _);
        publisher.monitor(second.clone() as _);
        publisher.push(3u32);
        assert_eq!(block_on(first.pop()).expect("first"), 3u32);
        assert_eq!(block_on(second.pop()).expect("second"), 3u32);
    }

    #[test]
    fn broken_subscriber_is_pruned() {
        let publisher = Publisher::new();
        let first = Queue::new();
        let second = Queue::new();
        publisher.monitor(first.clone() as _);
        publisher.monitor(second.clone() as _);
        first.close();
        publisher.push(1u32);
        assert_eq!(publisher.subscriber_count(), 1);
        assert_eq!(block_on(second.pop()).expect("second"), 1u32);
    }

    #[test]
    fn break_reaches_all_subscribers() {
        let publisher = Publisher::new();
        let queue = Queue::new();
        publisher.monitor(queue.clone() as _);
        publisher.close();
        assert!(block_on(queue.pop()).is_err());
        publisher.push(5u32);
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
