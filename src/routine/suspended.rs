//! FIFO lists of suspended routines.
//!
//! Every suspending primitive in the crate parks routines through a
//! [`SuspendedRoutineQueue`]: the waiting future enrolls a node holding its
//! waker, the structure's owner keeps the queue behind its own lock, and the
//! resumer unlinks the node *before* firing the wake. A node is never resumed
//! twice; a future that is dropped after its node was resumed must compensate
//! by passing the wakeup on (each primitive documents how).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Waker};

use crate::sync::spin::SpinMutex;

/// A single parked routine, optionally tagged with a key used to resume a
/// specific class of waiters.
pub struct SuspendedRoutineNode<K = ()> {
    key: K,
    resumed: AtomicBool,
    waker: SpinMutex<Option<Waker>>,
}

impl<K> SuspendedRoutineNode<K> {
    fn new(key: K, waker: Waker) -> Arc<Self> {
        Arc::new(Self {
            key,
            resumed: AtomicBool::new(false),
            waker: SpinMutex::new(Some(waker)),
        })
    }

    /// Whether the node has been unlinked and its routine resumed.
    pub fn is_resumed(&self) -> bool {
        self.resumed.load(Ordering::Acquire)
    }

    /// Re-parks the waiting routine. Returns `true` if the node has already
    /// been resumed, in which case no waker is stored and the caller must
    /// proceed. The resumed check happens under the waker lock, so a
    /// concurrent resume either sees the stored waker or is seen here.
    pub fn park(&self, cx: &Context<'_>) -> bool {
        let mut slot = self.waker.lock();
        if self.resumed.load(Ordering::Acquire) {
            return true;
        }
        match slot.as_mut() {
            Some(waker) if waker.will_wake(cx.waker()) => {}
            _ => *slot = Some(cx.waker().clone()),
        }
        false
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    fn resume(&self) {
        let waker = {
            let mut slot = self.waker.lock();
            self.resumed.store(true, Ordering::Release);
            slot.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// An insertion-ordered list of suspended routines.
///
/// The queue itself is not synchronized; callers guard it with the same lock
/// that guards the predicate the routines are waiting on.
pub struct SuspendedRoutineQueue<K = ()> {
    nodes: VecDeque<Arc<SuspendedRoutineNode<K>>>,
}

impl<K> SuspendedRoutineQueue<K> {
    pub fn new() -> Self {
        Self {
            nodes: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Enrolls the current routine, to be resumed in FIFO order.
    pub fn suspend(&mut self, key: K, cx: &Context<'_>) -> Arc<SuspendedRoutineNode<K>> {
        let node = SuspendedRoutineNode::new(key, cx.waker().clone());
        self.nodes.push_back(Arc::clone(&node));
        node
    }

    /// Resumes the first suspended routine. Returns whether one was resumed.
    pub fn resume_front(&mut self) -> bool {
        match self.nodes.pop_front() {
            Some(node) => {
                node.resume();
                true
            }
            None => false,
        }
    }

    /// Resumes every suspended routine in FIFO order.
    pub fn resume_all(&mut self) {
        let drained = std::mem::take(&mut self.nodes);
        for node in drained {
            node.resume();
        }
    }

    /// The key of the first suspended routine, if any.
    pub fn front_key(&self) -> Option<K>
    where
        K: Clone,
    {
        self.nodes.front().map(|node| node.key.clone())
    }

    /// Unlinks a node that no longer waits. Returns whether it was present.
    pub fn remove(&mut self, node: &Arc<SuspendedRoutineNode<K>>) -> bool {
        match self.nodes.iter().position(|entry| Arc::ptr_eq(entry, node)) {
            Some(index) => {
                self.nodes.remove(index);
                true
            }
            None => false,
        }
    }
}

impl<K: PartialEq> SuspendedRoutineQueue<K> {
    /// Resumes the first suspended routine whose key matches.
    pub fn resume_first_match(&mut self, key: &K) -> bool {
        match self.nodes.iter().position(|node| node.key == *key) {
            Some(index) => {
                let node = self.nodes.remove(index).expect("indexed node");
                node.resume();
                true
            }
            None => false,
        }
    }

    /// Resumes every suspended routine whose key matches, in FIFO order.
    pub fn resume_all_matches(&mut self, key: &K) {
        let mut matched = Vec::new();
        self.nodes.retain(|node| {
            if node.key == *key {
                matched.push(Arc::clone(node));
                false
            } else {
                true
            }
        });
        for node in matched {
            node.resume();
        }
    }
}

impl<K> Default for SuspendedRoutineQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::SuspendedRoutineQueue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Wake, Waker};

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn resume_front_is_fifo() {
        let counter_a = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let counter_b = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let mut queue = SuspendedRoutineQueue::new();
        let node_a = {
            let waker = Waker::from(Arc::clone(&counter_a));
            queue.suspend((), &Context::from_waker(&waker))
        };
        let _node_b = {
            let waker = Waker::from(Arc::clone(&counter_b));
            queue.suspend((), &Context::from_waker(&waker))
        };
        assert!(queue.resume_front());
        assert!(node_a.is_resumed());
        assert_eq!(counter_a.0.load(Ordering::SeqCst), 1);
        assert_eq!(counter_b.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn keyed_resume_skips_non_matching() {
        let woken = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let mut queue = SuspendedRoutineQueue::new();
        let waker = Waker::from(Arc::clone(&woken));
        let cx = Context::from_waker(&waker);
        let first = queue.suspend(1u32, &cx);
        let second = queue.suspend(2u32, &cx);
        assert!(queue.resume_first_match(&2));
        assert!(second.is_resumed());
        assert!(!first.is_resumed());
        assert!(!queue.resume_first_match(&2));
        assert!(queue.remove(&first));
    }
}
