use std::sync::Arc;
use std::time::Duration;

use girder::queue::Queue;
use girder::routine::block_on;
use girder::timer::{LiveTimer, Timer, TimerResult};
use girder::{Runtime, RuntimeConfig};

#[test]
fn a_runtime_bundles_scheduler_timers_and_reactor() {
    let runtime = Runtime::new(RuntimeConfig { worker_count: 2 }).expect("runtime");
    let results = Queue::new();

    let ticker = {
        let results = Arc::clone(&results);
        let timer = LiveTimer::new(runtime.timers(), Duration::from_millis(10));
        let queue = Queue::new();
        timer.publisher().monitor(queue.clone() as _);
        runtime.spawn(async move {
            timer.start();
            let result = queue.pop().await.expect("timer result");
            results.try_push(result).expect("record");
        })
    };
    ticker.wait();
    assert_eq!(
        block_on(results.pop()).expect("result"),
        TimerResult::Expired
    );
    runtime.scheduler().wait_until_idle();
    runtime.shutdown();
}

#[test]
fn timers_run_through_the_trait_object() {
    let runtime = Runtime::new(RuntimeConfig { worker_count: 1 }).expect("runtime");
    let timer: Arc<dyn Timer> = Arc::new(LiveTimer::new(
        runtime.timers(),
        Duration::from_millis(10),
    ));
    let results = Queue::new();
    timer.publisher().monitor(results.clone() as _);
    timer.start();
    block_on(timer.wait());
    assert_eq!(
        block_on(results.pop()).expect("result"),
        TimerResult::Expired
    );
    runtime.shutdown();
}
