// Database layer: PostgreSQL pool, repositories and in-memory stores

pub mod memory;
pub mod pool;
pub mod repositories;

pub use memory::{InMemoryAccountStore, InMemoryContentStore, InMemoryScheduledJobStore};
pub use pool::DbPool;
