// Common library for shared code across the scheduler and API binaries

pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod platforms;
pub mod publishing;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod token;
pub mod trigger;
