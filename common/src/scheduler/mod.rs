// Scheduler module: due-job processing and user scheduling operations

pub mod engine;

pub use engine::{SchedulerConfig, SchedulingCoordinator};
