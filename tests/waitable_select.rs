use std::sync::Arc;
use std::time::Duration;

use girder::queue::Queue;
use girder::routine::{block_on, Scheduler};
use girder::sync::{wait, wait_any, Waitable};
use girder::timer::{LiveTimer, TimerDriver, TriggerTimer};

#[test]
fn selection_reports_the_object_that_fired() {
    let data = Queue::new();
    let timer = TriggerTimer::new();
    timer.start();

    data.try_push(1u32).expect("push");
    let index = block_on(wait_any(&[&*data as &dyn Waitable, &timer]));
    assert_eq!(index, 0);
    assert_eq!(data.try_pop(), Some(1));

    timer.trigger();
    let index = block_on(wait_any(&[&*data as &dyn Waitable, &timer]));
    assert_eq!(index, 1);

    data.try_push(2).expect("push");
    block_on(wait(&*data as &dyn Waitable));
    assert_eq!(data.try_pop(), Some(2));
}

#[test]
fn a_deadline_interrupts_a_pop() {
    // Compose a pop-with-timeout: select over the data queue and a timer,
    // then close whichever path lost.
    let scheduler = Scheduler::new(2);
    let driver = TimerDriver::new();
    let data = Queue::<u32>::new();
    let outcomes = Queue::new();

    let waiter = {
        let data = Arc::clone(&data);
        let outcomes = Arc::clone(&outcomes);
        let timer = LiveTimer::new(&driver, Duration::from_millis(20));
        scheduler.spawn(async move {
            timer.start();
            let index = wait_any(&[&*data as &dyn Waitable, &timer]).await;
            let outcome = match index {
                0 => "data",
                _ => "timeout",
            };
            outcomes.try_push(outcome).expect("record");
        })
    };
    waiter.wait();
    assert_eq!(block_on(outcomes.pop()).expect("outcome"), "timeout");
    driver.shutdown();
    scheduler.shutdown();
}

#[test]
fn data_beats_a_distant_deadline() {
    let scheduler = Scheduler::new(2);
    let driver = TimerDriver::new();
    let data = Queue::<u32>::new();
    let outcomes = Queue::new();

    let waiter = {
        let data = Arc::clone(&data);
        let outcomes = Arc::clone(&outcomes);
        let timer = LiveTimer::new(&driver, Duration::from_secs(30));
        scheduler.spawn(async move {
            timer.start();
            let index = wait_any(&[&*data as &dyn Waitable, &timer]).await;
            if index == 0 {
                outcomes
                    .try_push(data.try_pop().expect("selected value"))
                    .expect("record");
            }
            timer.cancel().await;
        })
    };
    data.try_push(42).expect("push");
    waiter.wait();
    assert_eq!(block_on(outcomes.pop()).expect("outcome"), 42);
    driver.shutdown();
    scheduler.shutdown();
}
