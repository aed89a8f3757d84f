//! Cooperative routine scheduler and suspension-aware I/O substrate.
//!
//! A *routine* is a cooperatively scheduled task multiplexed onto a small
//! worker pool: a blocking I/O call, a mutex acquisition, a timer wait, and
//! a queue pop all suspend the routine, not the OS thread, so tens of
//! thousands of logical tasks share a handful of workers. The layers, leaves
//! first: the scheduler ([`routine`]), suspending synchronization
//! primitives ([`sync`]), timers ([`timer`]), queues and publishers
//! ([`queue`]), and the I/O contract surface ([`io`]) with its TCP transport
//! ([`net`]).

pub mod error;
pub mod io;
pub mod net;
pub mod queue;
pub mod routine;
pub mod runtime;
pub mod sync;
pub mod timer;

pub use error::{Error, Result};
pub use routine::{block_on, Scheduler};
pub use runtime::{Runtime, RuntimeConfig};
