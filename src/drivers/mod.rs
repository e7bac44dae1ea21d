//! Low-level GPIO helpers and task spawning.

pub mod gpio;
pub mod task_pin;
