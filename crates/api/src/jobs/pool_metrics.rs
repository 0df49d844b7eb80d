//! Background job that samples database connection pool gauges.
//!
//! The HTTP handlers and the import runner share one pool, so its
//! utilization is sampled on a short cadence.

use sqlx::PgPool;

use super::scheduler::{Job, JobFrequency};

/// Seconds between pool samples.
const SAMPLE_INTERVAL_SECS: u64 = 10;

/// Job that records connection pool size and idle counts as gauges.
pub struct PoolMetricsJob {
    pool: PgPool,
}

impl PoolMetricsJob {
    /// Create a new pool metrics job.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Job for PoolMetricsJob {
    fn name(&self) -> &'static str {
        "pool_metrics"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(SAMPLE_INTERVAL_SECS)
    }

    async fn execute(&self) -> Result<(), String> {
        persistence::metrics::record_pool_metrics(&self.pool);
        Ok(())
    }
}
