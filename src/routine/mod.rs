//! Cooperative routines and their scheduler.

pub mod scheduler;
pub mod suspended;

pub use scheduler::{
    block_on, current, execution_id, is_inside_routine, yield_now, ExecutionId, JoinHandle,
    RoutineId, Scheduler,
};
pub use suspended::{SuspendedRoutineNode, SuspendedRoutineQueue};
