//! Platform helpers shared by the subsystems.

pub mod task_pin;
