//! Import job ledger abstraction.
//!
//! The ledger is the durable record of every import job. All lifecycle
//! changes go through it: claiming a pending job, recording progress while
//! rows are processed, and finalizing to a terminal status. Writes are
//! guarded so concurrent workers and repeated deliveries cannot move a job
//! backwards.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::import_job::{
    ImportJob, ImportJobStatus, JobOutcome, NewImportJob, ProgressWrite, RowProgress,
};

/// Errors returned by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The referenced job does not exist.
    #[error("import job not found")]
    NotFound,

    /// The requested status change is not allowed from the job's current
    /// status. The job is left untouched.
    #[error("invalid import job transition from {from} to {to}")]
    InvalidTransition {
        from: ImportJobStatus,
        to: ImportJobStatus,
    },

    /// The underlying store failed.
    #[error("ledger backend error: {0}")]
    Backend(String),
}

/// Durable store for import jobs.
#[async_trait]
pub trait ImportLedger: Send + Sync {
    /// Create a new pending job and return it.
    async fn create(&self, new_job: NewImportJob) -> Result<ImportJob, LedgerError>;

    /// Look up a job by internal id.
    async fn find(&self, id: Uuid) -> Result<Option<ImportJob>, LedgerError>;

    /// Look up a clinic's job by public job id.
    async fn find_by_job_id(
        &self,
        clinic_id: Uuid,
        job_id: &str,
    ) -> Result<Option<ImportJob>, LedgerError>;

    /// Pending jobs in submission order, up to `limit`.
    async fn find_pending(&self, limit: i64) -> Result<Vec<ImportJob>, LedgerError>;

    /// Jobs left in processing by an earlier run, up to `limit`.
    async fn find_resumable(&self, limit: i64) -> Result<Vec<ImportJob>, LedgerError>;

    /// A clinic's jobs, newest first.
    async fn list_for_clinic(
        &self,
        clinic_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ImportJob>, LedgerError>;

    /// Total number of jobs for a clinic.
    async fn count_for_clinic(&self, clinic_id: Uuid) -> Result<i64, LedgerError>;

    /// Claim a pending job for processing. Returns true for exactly one
    /// caller; false when the job is missing or no longer pending.
    async fn claim(&self, id: Uuid) -> Result<bool, LedgerError>;

    /// Record a cumulative progress snapshot.
    ///
    /// The write is applied only while the job is processing and only when
    /// the snapshot moves the processed count forward. A stale or repeated
    /// snapshot is a no-op. The result always carries the current
    /// cancellation flag so the worker observes cancel requests at flush
    /// time.
    async fn record_progress(
        &self,
        id: Uuid,
        progress: &RowProgress,
    ) -> Result<ProgressWrite, LedgerError>;

    /// Move a job to its terminal status with final counters.
    ///
    /// Fails with [`LedgerError::InvalidTransition`] when the job is already
    /// terminal, leaving the stored job untouched.
    async fn finalize(&self, id: Uuid, outcome: JobOutcome) -> Result<ImportJob, LedgerError>;

    /// Flag a clinic's job for cancellation. Returns true when the flag was
    /// set, false when the job is missing or already terminal.
    async fn request_cancel(&self, clinic_id: Uuid, job_id: &str) -> Result<bool, LedgerError>;
}

/// In-memory ledger for development and testing.
///
/// Mirrors the guarded write semantics of the database-backed ledger.
#[derive(Debug, Default)]
pub struct InMemoryImportLedger {
    jobs: tokio::sync::Mutex<Vec<ImportJob>>,
}

impl InMemoryImportLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImportLedger for InMemoryImportLedger {
    async fn create(&self, new_job: NewImportJob) -> Result<ImportJob, LedgerError> {
        let id = Uuid::new_v4();
        let job = ImportJob {
            id,
            job_id: format!("import_{}", id.simple()),
            clinic_id: new_job.clinic_id,
            submitted_by: new_job.submitted_by,
            source_filename: new_job.source_filename,
            stored_path: new_job.stored_path,
            source_checksum: new_job.source_checksum,
            mapping: new_job.mapping,
            status: ImportJobStatus::Pending,
            total_rows: new_job.total_rows,
            processed_rows: 0,
            succeeded_rows: 0,
            failed_rows: 0,
            row_errors: Vec::new(),
            failure_reason: None,
            error_report_path: None,
            cancel_requested: false,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        };

        let mut jobs = self.jobs.lock().await;
        jobs.push(job.clone());
        Ok(job)
    }

    async fn find(&self, id: Uuid) -> Result<Option<ImportJob>, LedgerError> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn find_by_job_id(
        &self,
        clinic_id: Uuid,
        job_id: &str,
    ) -> Result<Option<ImportJob>, LedgerError> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .iter()
            .find(|j| j.clinic_id == clinic_id && j.job_id == job_id)
            .cloned())
    }

    async fn find_pending(&self, limit: i64) -> Result<Vec<ImportJob>, LedgerError> {
        let jobs = self.jobs.lock().await;
        let mut pending: Vec<ImportJob> = jobs
            .iter()
            .filter(|j| j.status == ImportJobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|j| j.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn find_resumable(&self, limit: i64) -> Result<Vec<ImportJob>, LedgerError> {
        let jobs = self.jobs.lock().await;
        let mut resumable: Vec<ImportJob> = jobs
            .iter()
            .filter(|j| j.status == ImportJobStatus::Processing)
            .cloned()
            .collect();
        resumable.sort_by_key(|j| j.created_at);
        resumable.truncate(limit.max(0) as usize);
        Ok(resumable)
    }

    async fn list_for_clinic(
        &self,
        clinic_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ImportJob>, LedgerError> {
        let jobs = self.jobs.lock().await;
        let mut listed: Vec<ImportJob> = jobs
            .iter()
            .filter(|j| j.clinic_id == clinic_id)
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_for_clinic(&self, clinic_id: Uuid) -> Result<i64, LedgerError> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.iter().filter(|j| j.clinic_id == clinic_id).count() as i64)
    }

    async fn claim(&self, id: Uuid) -> Result<bool, LedgerError> {
        let mut jobs = self.jobs.lock().await;
        match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) if job.status == ImportJobStatus::Pending => {
                job.status = ImportJobStatus::Processing;
                job.started_at = Some(chrono::Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_progress(
        &self,
        id: Uuid,
        progress: &RowProgress,
    ) -> Result<ProgressWrite, LedgerError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(LedgerError::NotFound)?;

        let applied = job.status == ImportJobStatus::Processing
            && progress.processed_rows > job.processed_rows;
        if applied {
            job.processed_rows = progress.processed_rows;
            job.succeeded_rows = progress.succeeded_rows;
            job.failed_rows = progress.failed_rows;
            job.row_errors = progress.row_errors.clone();
        }

        Ok(ProgressWrite {
            applied,
            cancel_requested: job.cancel_requested,
        })
    }

    async fn finalize(&self, id: Uuid, outcome: JobOutcome) -> Result<ImportJob, LedgerError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(LedgerError::NotFound)?;

        let to = outcome.status();
        if !job.status.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition {
                from: job.status,
                to,
            });
        }

        let progress = outcome.progress();
        job.status = to;
        job.processed_rows = progress.processed_rows;
        job.succeeded_rows = progress.succeeded_rows;
        job.failed_rows = progress.failed_rows;
        job.row_errors = progress.row_errors.clone();
        job.failure_reason = outcome.failure_reason().map(|r| r.to_string());
        job.error_report_path = outcome.error_report_path().map(|p| p.to_string());
        job.completed_at = Some(chrono::Utc::now());
        Ok(job.clone())
    }

    async fn request_cancel(&self, clinic_id: Uuid, job_id: &str) -> Result<bool, LedgerError> {
        let mut jobs = self.jobs.lock().await;
        match jobs
            .iter_mut()
            .find(|j| j.clinic_id == clinic_id && j.job_id == job_id)
        {
            Some(job) if !job.status.is_terminal() => {
                job.cancel_requested = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
