//! Background job scheduler and job implementations.

mod import_processing;
mod pool_metrics;
mod scheduler;

pub use import_processing::ImportProcessingJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::JobScheduler;
