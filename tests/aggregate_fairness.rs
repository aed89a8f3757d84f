use std::sync::Arc;

use girder::queue::{AggregateQueueReader, Queue, QueueReader, WaitableQueueReader};
use girder::routine::block_on;
use girder::Error;

fn aggregate_of(
    queues: &[Arc<Queue<u32>>],
) -> AggregateQueueReader<u32> {
    AggregateQueueReader::new(
        queues
            .iter()
            .map(|queue| Arc::clone(queue) as Arc<dyn WaitableQueueReader<u32>>)
            .collect(),
    )
}

#[test]
fn pops_follow_push_order_across_sources() {
    let first = Queue::new();
    let second = Queue::new();
    let aggregate = aggregate_of(&[Arc::clone(&first), Arc::clone(&second)]);

    second.try_push(1).expect("push");
    assert_eq!(block_on(aggregate.pop()).expect("pop"), 1);
    first.try_push(2).expect("push");
    assert_eq!(block_on(aggregate.pop()).expect("pop"), 2);
    second.try_push(3).expect("push");
    assert_eq!(block_on(aggregate.pop()).expect("pop"), 3);
    first.try_push(4).expect("push");
    assert_eq!(block_on(aggregate.pop()).expect("pop"), 4);
}

#[test]
fn breaking_the_aggregate_breaks_every_source() {
    let first = Queue::new();
    let second = Queue::new();
    let aggregate = aggregate_of(&[Arc::clone(&first), Arc::clone(&second)]);

    aggregate.close();
    assert!(first.is_broken());
    assert!(second.is_broken());
}

#[test]
fn aggregate_reports_broken_once_sources_drain() {
    let first = Queue::new();
    let second = Queue::new();
    let aggregate = aggregate_of(&[Arc::clone(&first), Arc::clone(&second)]);

    first.try_push(7).expect("push");
    first.close();
    second.close();
    assert_eq!(block_on(aggregate.pop()).expect("drain"), 7);
    assert!(matches!(
        block_on(aggregate.pop()),
        Err(Error::PipeBroken(_))
    ));
}

#[test]
fn dropping_the_aggregate_closes_its_sources() {
    let source = Queue::<u32>::new();
    {
        let _aggregate = aggregate_of(&[Arc::clone(&source)]);
    }
    assert!(source.is_broken());
}
