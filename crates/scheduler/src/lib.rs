pub mod scheduler;

pub use scheduler::{Job, JobStats, JobStatsSnapshot, Scheduler};
