use std::sync::Arc;

use girder::queue::Queue;
use girder::routine::{block_on, Scheduler};
use girder::sync::{ConditionVariable, Mutex, RecursiveMutex};

#[test]
fn unlock_hands_the_mutex_to_the_waiter() {
    let scheduler = Scheduler::new(2);
    let mutex = Arc::new(Mutex::new(()));
    let events = Queue::new();
    let release = Queue::new();

    let holder = {
        let mutex = Arc::clone(&mutex);
        let events = Arc::clone(&events);
        let release = Arc::clone(&release);
        scheduler.spawn(async move {
            let guard = mutex.lock().await;
            events.try_push("a-locks").expect("record");
            release.pop().await.expect("release signal");
            events.try_push("a-unlocks").expect("record");
            drop(guard);
        })
    };
    assert_eq!(block_on(events.pop()).expect("event"), "a-locks");

    let waiter = {
        let mutex = Arc::clone(&mutex);
        let events = Arc::clone(&events);
        scheduler.spawn(async move {
            events.try_push("b-waits").expect("record");
            let guard = mutex.lock().await;
            events.try_push("b-acquires").expect("record");
            drop(guard);
        })
    };
    assert_eq!(block_on(events.pop()).expect("event"), "b-waits");

    release.try_push(()).expect("release");
    holder.wait();
    waiter.wait();
    assert_eq!(block_on(events.pop()).expect("event"), "a-unlocks");
    assert_eq!(block_on(events.pop()).expect("event"), "b-acquires");
    scheduler.shutdown();
}

#[test]
fn contended_lock_is_mutually_exclusive() {
    let scheduler = Scheduler::new(4);
    let counter = Arc::new(Mutex::new(0u64));
    let mut handles = Vec::new();
    for _ in 0..16 {
        let counter = Arc::clone(&counter);
        handles.push(scheduler.spawn(async move {
            for _ in 0..500 {
                let mut guard = counter.lock().await;
                *guard += 1;
            }
        }));
    }
    for handle in handles {
        handle.wait();
    }
    assert_eq!(*block_on(counter.lock()), 16 * 500);
    scheduler.shutdown();
}

#[test]
fn try_lock_does_not_suspend() {
    let mutex = Mutex::new(5);
    let guard = mutex.try_lock().expect("free mutex");
    assert!(mutex.try_lock().is_none());
    drop(guard);
    assert_eq!(*mutex.try_lock().expect("free again"), 5);
}

#[test]
fn condition_variable_wakes_the_waiter() {
    let scheduler = Scheduler::new(2);
    let state = Arc::new(Mutex::new(false));
    let condition = Arc::new(ConditionVariable::new());
    let events = Queue::new();

    let waiter = {
        let state = Arc::clone(&state);
        let condition = Arc::clone(&condition);
        let events = Arc::clone(&events);
        scheduler.spawn(async move {
            events.try_push("waiting").expect("record");
            let mut guard = state.lock().await;
            while !*guard {
                guard = condition.wait(guard).await;
            }
            events.try_push("woken").expect("record");
        })
    };
    assert_eq!(block_on(events.pop()).expect("event"), "waiting");

    block_on(async {
        let mut guard = state.lock().await;
        *guard = true;
        drop(guard);
        condition.notify_one();
    });
    waiter.wait();
    assert_eq!(block_on(events.pop()).expect("event"), "woken");
    scheduler.shutdown();
}

#[test]
fn recursive_mutex_reenters_for_the_owner() {
    let scheduler = Scheduler::new(2);
    let mutex = Arc::new(RecursiveMutex::new());
    let handle = {
        let mutex = Arc::clone(&mutex);
        scheduler.spawn(async move {
            let outer = mutex.lock().await;
            let inner = mutex.lock().await;
            drop(inner);
            drop(outer);
        })
    };
    handle.wait();
    assert!(mutex.try_lock().is_some());
    scheduler.shutdown();
}

#[test]
fn recursive_mutex_excludes_other_routines() {
    let scheduler = Scheduler::new(2);
    let mutex = Arc::new(RecursiveMutex::new());
    let events = Queue::new();
    let release = Queue::new();

    let holder = {
        let mutex = Arc::clone(&mutex);
        let events = Arc::clone(&events);
        let release = Arc::clone(&release);
        scheduler.spawn(async move {
            let outer = mutex.lock().await;
            let inner = mutex.lock().await;
            events.try_push("held").expect("record");
            release.pop().await.expect("release signal");
            drop(inner);
            drop(outer);
        })
    };
    assert_eq!(block_on(events.pop()).expect("event"), "held");

    let contender = {
        let mutex = Arc::clone(&mutex);
        let events = Arc::clone(&events);
        scheduler.spawn(async move {
            let guard = mutex.lock().await;
            events.try_push("acquired").expect("record");
            drop(guard);
        })
    };
    release.try_push(()).expect("release");
    holder.wait();
    contender.wait();
    assert_eq!(block_on(events.pop()).expect("event"), "acquired");
    scheduler.shutdown();
}
