// PostgreSQL implementations of the store traits

pub mod account;
pub mod content;
pub mod scheduled_job;

pub use account::AccountRepository;
pub use content::ContentRepository;
pub use scheduled_job::{ScheduledJobRepository, STALE_CLAIM_ERROR};
