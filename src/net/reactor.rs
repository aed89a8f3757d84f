//! The socket readiness driver.
//!
//! One thread polls a `mio::Poll`; every registered socket gets a pair of
//! direction slots (read, write). A readiness event marks the slot ready and
//! wakes the routine parked on it. Routines always attempt the I/O first and
//! only park after `WouldBlock`, so edge-triggered delivery is sufficient.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::thread;

use log::{debug, warn};
use mio::{Events, Interest, Registry, Token};

use crate::error::Result;
use crate::sync::spin::SpinMutex;

const WAKE_TOKEN: Token = Token(0);

struct Direction {
    ready: bool,
    waker: Option<Waker>,
}

/// Readiness state for one direction of one socket.
pub(crate) struct DirectionState {
    inner: SpinMutex<Direction>,
}

impl DirectionState {
    fn new() -> Self {
        Self {
            inner: SpinMutex::new(Direction {
                ready: false,
                waker: None,
            }),
        }
    }

    /// Marks the direction ready and wakes the parked routine, if any.
    pub(crate) fn wake_ready(&self) {
        let waker = {
            let mut direction = self.inner.lock();
            direction.ready = true;
            direction.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Non-consuming peek, for advisory `poll` implementations.
    pub(crate) fn is_ready(&self) -> bool {
        self.inner.lock().ready
    }

    /// Suspends until the direction has seen a readiness edge since the last
    /// consume. Callers retry the I/O afterwards.
    pub(crate) fn ready(&self) -> ReadyFuture<'_> {
        ReadyFuture { direction: self }
    }

    fn consume_ready(&self, cx: &Context<'_>) -> bool {
        let mut direction = self.inner.lock();
        if direction.ready {
            direction.ready = false;
            direction.waker = None;
            true
        } else {
            match direction.waker.as_ref() {
                Some(waker) if waker.will_wake(cx.waker()) => {}
                _ => direction.waker = Some(cx.waker().clone()),
            }
            false
        }
    }
}

pub(crate) struct ReadyFuture<'a> {
    direction: &'a DirectionState,
}

impl Future for ReadyFuture<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.direction.consume_ready(cx) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// The two direction slots of one registered socket.
pub(crate) struct IoWakers {
    pub(crate) read: DirectionState,
    pub(crate) write: DirectionState,
}

impl IoWakers {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            read: DirectionState::new(),
            write: DirectionState::new(),
        })
    }
}

struct ReactorShared {
    registry: Registry,
    sources: Mutex<HashMap<Token, Arc<IoWakers>>>,
    next_token: AtomicUsize,
    waker: mio::Waker,
    shutdown: AtomicBool,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

/// A cheap, cloneable handle to the readiness driver thread.
#[derive(Clone)]
pub struct Reactor {
    shared: Arc<ReactorShared>,
}

impl Reactor {
    pub fn new() -> Result<Self> {
        let poll = mio::Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = mio::Waker::new(poll.registry(), WAKE_TOKEN)?;
        let shared = Arc::new(ReactorShared {
            registry,
            sources: Mutex::new(HashMap::new()),
            next_token: AtomicUsize::new(1),
            waker,
            shutdown: AtomicBool::new(false),
            thread: Mutex::new(None),
        });
        let run_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("girder-reactor".into())
            .spawn(move || Self::run(poll, &run_shared))
            .expect("spawn reactor thread");
        *shared.thread.lock().expect("thread lock") = Some(handle);
        Ok(Self { shared })
    }

    /// Registers a socket for both directions and returns its waker slots.
    pub(crate) fn register<S: mio::event::Source + ?Sized>(
        &self,
        source: &mut S,
    ) -> Result<(Token, Arc<IoWakers>)> {
        let token = Token(self.shared.next_token.fetch_add(1, Ordering::Relaxed));
        self.shared
            .registry
            .register(source, token, Interest::READABLE | Interest::WRITABLE)?;
        let wakers = IoWakers::new();
        self.shared
            .sources
            .lock()
            .expect("sources lock")
            .insert(token, Arc::clone(&wakers));
        Ok((token, wakers))
    }

    /// Removes a socket from the driver. Called when its owner drops.
    pub(crate) fn deregister<S: mio::event::Source + ?Sized>(
        &self,
        token: Token,
        source: &mut S,
    ) {
        let _ = self.shared.registry.deregister(source);
        self.shared
            .sources
            .lock()
            .expect("sources lock")
            .remove(&token);
    }

    /// Stops the driver thread. Registered sockets stop receiving wakeups.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let _ = self.shared.waker.wake();
        let handle = self.shared.thread.lock().expect("thread lock").take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn run(mut poll: mio::Poll, shared: &Arc<ReactorShared>) {
        debug!("reactor started");
        let mut events = Events::with_capacity(256);
        loop {
            if shared.shutdown.load(Ordering::Acquire) {
                return;
            }
            if let Err(error) = poll.poll(&mut events, None) {
                if error.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                warn!("reactor poll failed: {error}");
                return;
            }
            for event in events.iter() {
                if event.token() == WAKE_TOKEN {
                    continue;
                }
                let wakers = shared
                    .sources
                    .lock()
                    .expect("sources lock")
                    .get(&event.token())
                    .cloned();
                let Some(wakers) = wakers else {
                    continue;
                };
                if event.is_readable() || event.is_read_closed() || event.is_error() {
                    wakers.read.wake_ready();
                }
                if event.is_writable() || event.is_write_closed() || event.is_error() {
                    wakers.write.wake_ready();
                }
            }
        }
    }
}
