use std::sync::Arc;
use std::time::Duration;

use girder::queue::{ConverterQueueWriter, Queue, QueueWriter};
use girder::routine::block_on;
use girder::timer::{LiveTimer, TimerDriver, TimerResult};

#[test]
fn two_timers_expire_in_deadline_order() {
    let driver = TimerDriver::new();
    let fast = LiveTimer::new(&driver, Duration::from_millis(30));
    let slow = LiveTimer::new(&driver, Duration::from_millis(90));
    let results = Queue::new();

    // Tag each timer's publications so the pop order identifies the source.
    let fast_tag: Arc<dyn QueueWriter<TimerResult>> = Arc::new(ConverterQueueWriter::new(
        results.clone() as _,
        |result| ("fast", result),
    ));
    let slow_tag: Arc<dyn QueueWriter<TimerResult>> = Arc::new(ConverterQueueWriter::new(
        results.clone() as _,
        |result| ("slow", result),
    ));
    fast.publisher().monitor(Arc::clone(&fast_tag));
    slow.publisher().monitor(Arc::clone(&slow_tag));

    slow.start();
    fast.start();
    assert_eq!(
        block_on(results.pop()).expect("first result"),
        ("fast", TimerResult::Expired)
    );
    assert_eq!(
        block_on(results.pop()).expect("second result"),
        ("slow", TimerResult::Expired)
    );
    driver.shutdown();
}

#[test]
fn cancel_publishes_canceled_and_unblocks_wait() {
    let driver = TimerDriver::new();
    let timer = LiveTimer::new(&driver, Duration::from_secs(30));
    let results = Queue::new();
    timer.publisher().monitor(results.clone() as _);

    timer.start();
    block_on(timer.cancel());
    assert_eq!(
        block_on(results.pop()).expect("result"),
        TimerResult::Canceled
    );
    // The timer is idle again; wait returns immediately.
    block_on(timer.wait());
    driver.shutdown();
}

#[test]
fn cancel_on_an_idle_timer_is_a_no_op() {
    let driver = TimerDriver::new();
    let timer = LiveTimer::new(&driver, Duration::from_millis(10));
    let results = Queue::new();
    timer.publisher().monitor(results.clone() as _);

    block_on(timer.cancel());
    assert!(results.is_empty());
    driver.shutdown();
}

#[test]
fn each_start_publishes_exactly_one_result() {
    let driver = TimerDriver::new();
    let timer = LiveTimer::new(&driver, Duration::from_millis(10));
    let results = Queue::new();
    timer.publisher().monitor(results.clone() as _);

    for _ in 0..3 {
        timer.start();
        // A second start while pending is ignored.
        timer.start();
        block_on(timer.wait());
    }
    for _ in 0..3 {
        assert_eq!(
            block_on(results.pop()).expect("result"),
            TimerResult::Expired
        );
    }
    assert!(results.is_empty());
    driver.shutdown();
}
