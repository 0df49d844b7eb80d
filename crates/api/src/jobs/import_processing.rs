//! Import processing background job.
//!
//! Polls the import job ledger on a fixed cadence and drains pending bulk
//! imports through the runner service.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use persistence::repositories::{CaseRecordRepository, ImportJobRepository};

use crate::services::{CancelRegistry, ImportRunnerConfig, ImportRunnerService};

use super::scheduler::{Job, JobFrequency};

/// Background job that claims and runs pending import jobs.
pub struct ImportProcessingJob {
    pool: PgPool,
    batch_size: u32,
    poll_interval_secs: u64,
    cancel_registry: CancelRegistry,
    runner_config: ImportRunnerConfig,
}

impl ImportProcessingJob {
    /// Create a new import processing job.
    ///
    /// # Arguments
    /// * `pool` - Database connection pool
    /// * `batch_size` - Number of jobs to process per pass
    /// * `poll_interval_secs` - Seconds between ledger polls
    /// * `cancel_registry` - Cancellation flags shared with the HTTP layer
    /// * `runner_config` - Runner tuning from the imports config section
    pub fn new(
        pool: PgPool,
        batch_size: u32,
        poll_interval_secs: u64,
        cancel_registry: CancelRegistry,
        runner_config: ImportRunnerConfig,
    ) -> Self {
        Self {
            pool,
            batch_size,
            poll_interval_secs,
            cancel_registry,
            runner_config,
        }
    }
}

#[async_trait::async_trait]
impl Job for ImportProcessingJob {
    fn name(&self) -> &'static str {
        "import_processing"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.poll_interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        let runner = ImportRunnerService::new(
            Arc::new(ImportJobRepository::new(self.pool.clone())),
            Arc::new(CaseRecordRepository::new(self.pool.clone())),
            self.cancel_registry.clone(),
            self.runner_config.clone(),
        );

        let processed = runner
            .process_pending_jobs(self.batch_size)
            .await
            .map_err(|e| format!("Failed to process import jobs: {}", e))?;

        if processed > 0 {
            info!(
                processed = processed,
                batch_size = self.batch_size,
                "Processed import jobs"
            );
        }

        Ok(())
    }
}
