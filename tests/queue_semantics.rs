use std::sync::Arc;

use girder::queue::converter::task_queue_writer;
use girder::queue::{
    ConverterQueueReader, Queue, QueueReader, QueueWriter, ScopedQueueReader,
    ScopedQueueWriter, Task,
};
use girder::routine::{block_on, Scheduler};
use girder::Error;

#[test]
fn consumer_sees_a_prefix_of_the_producer_sequence() {
    let scheduler = Scheduler::new(2);
    let queue = Queue::new();

    let producer = {
        let queue = Arc::clone(&queue);
        scheduler.spawn(async move {
            for value in 0..1000u32 {
                queue.push(value).await;
            }
            queue.close();
        })
    };
    let received = Queue::new();
    let consumer = {
        let queue = Arc::clone(&queue);
        let received = Arc::clone(&received);
        scheduler.spawn(async move {
            while let Ok(value) = queue.pop().await {
                received.try_push(value).expect("record");
            }
        })
    };
    producer.wait();
    consumer.wait();
    for expected in 0..1000u32 {
        assert_eq!(received.try_pop(), Some(expected));
    }
    scheduler.shutdown();
}

#[test]
fn bounded_queue_suspends_the_producer() {
    let scheduler = Scheduler::new(2);
    let queue = Queue::with_capacity(2);

    let producer = {
        let queue = Arc::clone(&queue);
        scheduler.spawn(async move {
            for value in 0..50u32 {
                queue.push(value).await;
            }
        })
    };
    // The queue never exceeds its bound while the producer races ahead.
    let mut received = Vec::new();
    while received.len() < 50 {
        assert!(queue.len() <= 2);
        if let Some(value) = queue.try_pop() {
            received.push(value);
        }
    }
    producer.wait();
    assert_eq!(received, (0..50).collect::<Vec<_>>());
    scheduler.shutdown();
}

#[test]
fn pop_suspends_until_a_value_arrives() {
    let scheduler = Scheduler::new(2);
    let queue = Queue::new();
    let consumer = {
        let queue = Arc::clone(&queue);
        scheduler.spawn(async move {
            assert_eq!(queue.pop().await.expect("pop"), 17);
        })
    };
    queue.try_push(17).expect("push");
    consumer.wait();
    scheduler.shutdown();
}

#[test]
fn breaking_resumes_suspended_consumers() {
    let scheduler = Scheduler::new(2);
    let queue = Queue::<u32>::new();
    let consumer = {
        let queue = Arc::clone(&queue);
        scheduler.spawn(async move {
            assert!(matches!(
                queue.pop().await,
                Err(Error::PipeBroken(None))
            ));
        })
    };
    queue.close();
    consumer.wait();
    scheduler.shutdown();
}

#[test]
fn scoped_writer_breaks_on_drop() {
    let queue = Queue::new();
    {
        let writer = ScopedQueueWriter::new(queue.clone() as _);
        writer.try_push(1u32).expect("push");
    }
    assert_eq!(block_on(queue.pop()).expect("drain"), 1u32);
    assert!(block_on(queue.pop()).is_err());
}

#[test]
fn scoped_reader_breaks_on_drop() {
    let queue = Queue::new();
    {
        let reader = ScopedQueueReader::new(queue.clone() as _);
        queue.try_push(4u32).expect("push");
        assert_eq!(block_on(reader.pop()).expect("pop"), 4u32);
    }
    assert!(queue.is_broken());
    // Push stays total: the value is silently dropped.
    queue.try_push(5).expect("push after break");
    assert!(queue.is_empty());
}

#[test]
fn converter_reader_maps_popped_values() {
    let queue = Queue::new();
    queue.try_push(21u32).expect("push");
    let doubled = ConverterQueueReader::new(queue.clone() as _, |value: u32| value * 2);
    assert_eq!(block_on(doubled.pop()).expect("pop"), 42);
    doubled.close();
    assert!(queue.is_broken());
}

#[test]
fn task_queue_runs_bundled_handlers() {
    let scheduler = Scheduler::new(2);
    let tasks: Arc<Queue<Task>> = Queue::new();
    let outputs = Queue::new();

    let runner = {
        let tasks = Arc::clone(&tasks);
        scheduler.spawn(async move {
            while let Ok(task) = tasks.pop().await {
                task();
            }
        })
    };
    let updates = {
        let outputs = Arc::clone(&outputs);
        task_queue_writer(&tasks, move |value: u32| {
            outputs.try_push(value + 100).expect("record");
        })
    };
    updates.try_push(1).expect("push");
    updates.try_push(2).expect("push");
    assert_eq!(block_on(outputs.pop()).expect("first"), 101);
    assert_eq!(block_on(outputs.pop()).expect("second"), 102);
    tasks.close();
    runner.wait();
    scheduler.shutdown();
}
