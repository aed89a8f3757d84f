//! Suspension-aware synchronization primitives.
//!
//! Every blocking operation in this module suspends the current routine
//! rather than the OS thread, following one discipline: take the predicate
//! lock, return immediately if the predicate already holds, otherwise enroll
//! in a FIFO waiter list guarded by that lock and yield. Waiters are always
//! woken in FIFO order.

pub mod condition;
pub mod mutex;
pub mod spin;
pub mod waitable;

pub use condition::ConditionVariable;
pub use mutex::{Mutex, MutexGuard, RecursiveMutex, RecursiveMutexGuard};
pub use spin::{SpinMutex, SpinMutexGuard};
pub use waitable::{wait, wait_any, AvailabilityToken, Waitable, WaitableCore};
