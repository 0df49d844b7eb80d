//! Import job runner.
//!
//! Drains the ledger's pending queue and drives each claimed job to a
//! terminal status: rows are projected through the job's stored mapping,
//! validated, checked against existing cases and persisted one at a time.
//! Progress is flushed to the ledger on a bounded cadence, so a crash loses
//! at most one flush window. One bad row never aborts a run; a stream of
//! identical persistence failures does.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use domain::models::{
    resolve_mapping, DuplicateSignature, ImportJob, JobOutcome, ResolvedMapping, RowTally,
};
use domain::services::{
    project_row, validate_draft, CaseStore, ImportLedger, LedgerError, RawRow, RowSource,
};

use crate::config::ImportsConfig;
use crate::middleware::metrics::{
    record_import_completed, record_import_failed, record_rows_processed,
};
use crate::services::csv_rows::CsvRowSource;

/// Failure reason recorded when a job stops on a cancel request.
const CANCELLED_BY_USER: &str = "cancelled by user";

/// Errors that abort a runner pass.
///
/// Per-row failures and unreadable files never surface here; they are folded
/// into the job's terminal outcome instead.
#[derive(Debug, thiserror::Error)]
pub enum ImportRunError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// In-process cancellation flags shared between the HTTP cancel endpoint and
/// the runner, so a cancel from the same instance lands between rows without
/// waiting for the next ledger flush.
#[derive(Debug, Clone, Default)]
pub struct CancelRegistry {
    inner: Arc<RwLock<HashSet<Uuid>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a job for cancellation.
    pub fn request(&self, id: Uuid) {
        self.inner.write().unwrap().insert(id);
    }

    /// Whether cancellation has been requested for the job.
    pub fn is_requested(&self, id: Uuid) -> bool {
        self.inner.read().unwrap().contains(&id)
    }

    /// Drop the flag once the job reached a terminal status.
    pub fn clear(&self, id: Uuid) {
        self.inner.write().unwrap().remove(&id);
    }
}

/// Runner tuning, taken from the imports config section.
#[derive(Debug, Clone)]
pub struct ImportRunnerConfig {
    pub uploads_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub progress_flush_rows: i64,
    pub max_recorded_row_errors: usize,
    pub circuit_breaker_row_failures: u32,
    pub duplicate_detection: bool,
}

impl From<&ImportsConfig> for ImportRunnerConfig {
    fn from(config: &ImportsConfig) -> Self {
        Self {
            uploads_dir: PathBuf::from(&config.uploads_dir),
            reports_dir: PathBuf::from(&config.reports_dir),
            progress_flush_rows: config.progress_flush_rows,
            max_recorded_row_errors: config.max_recorded_row_errors,
            circuit_breaker_row_failures: config.circuit_breaker_row_failures,
            duplicate_detection: config.duplicate_detection,
        }
    }
}

/// Counts consecutive identical persistence failure messages.
///
/// Validation failures and duplicate hits never feed the streak; only the
/// store reporting the same thing row after row trips it.
#[derive(Debug)]
struct CircuitBreaker {
    threshold: u32,
    streak: u32,
    last_message: Option<String>,
}

impl CircuitBreaker {
    fn new(threshold: u32) -> Self {
        Self {
            threshold,
            streak: 0,
            last_message: None,
        }
    }

    fn observe_failure(&mut self, message: &str) {
        if self.last_message.as_deref() == Some(message) {
            self.streak += 1;
        } else {
            self.last_message = Some(message.to_string());
            self.streak = 1;
        }
    }

    fn observe_success(&mut self) {
        self.streak = 0;
        self.last_message = None;
    }

    fn tripped(&self) -> bool {
        self.streak >= self.threshold
    }

    fn last_message(&self) -> &str {
        self.last_message.as_deref().unwrap_or_default()
    }
}

/// Drives import jobs from claim to terminal status.
pub struct ImportRunnerService {
    ledger: Arc<dyn ImportLedger>,
    case_store: Arc<dyn CaseStore>,
    cancel_registry: CancelRegistry,
    config: ImportRunnerConfig,
}

impl ImportRunnerService {
    pub fn new(
        ledger: Arc<dyn ImportLedger>,
        case_store: Arc<dyn CaseStore>,
        cancel_registry: CancelRegistry,
        config: ImportRunnerConfig,
    ) -> Self {
        Self {
            ledger,
            case_store,
            cancel_registry,
            config,
        }
    }

    /// One scheduler pass: resume jobs a previous run left in processing,
    /// then claim and run pending ones. Returns the number of jobs driven to
    /// a terminal status.
    pub async fn process_pending_jobs(&self, batch_size: u32) -> Result<u32, ImportRunError> {
        let mut handled = 0u32;

        let resumable = self.ledger.find_resumable(batch_size as i64).await?;
        for job in resumable {
            let job_id = job.job_id.clone();
            info!(
                job_id = %job_id,
                processed = job.processed_rows,
                "Resuming interrupted import job"
            );
            match self.resume_job(job).await {
                Ok(finished) => {
                    handled += 1;
                    info!(job_id = %job_id, status = %finished.status, "Resumed import job finished");
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Failed to resume import job");
                }
            }
        }

        let pending = self.ledger.find_pending(batch_size as i64).await?;
        if !pending.is_empty() {
            info!(count = pending.len(), "Processing pending import jobs");
        }
        for job in pending {
            if !self.ledger.claim(job.id).await? {
                // Lost the claim to another worker.
                continue;
            }
            let job_id = job.job_id.clone();
            match self.run_claimed_job(job).await {
                Ok(finished) => {
                    handled += 1;
                    info!(
                        job_id = %job_id,
                        status = %finished.status,
                        succeeded = finished.succeeded_rows,
                        failed = finished.failed_rows,
                        "Import job finished"
                    );
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Import job run failed");
                }
            }
        }

        Ok(handled)
    }

    async fn run_claimed_job(&self, job: ImportJob) -> Result<ImportJob, ImportRunError> {
        // Re-read after the claim so a cancel that landed before processing
        // started is observed immediately.
        let job = self
            .ledger
            .find(job.id)
            .await?
            .ok_or(LedgerError::NotFound)?;
        self.run_job(job, RowTally::new()).await
    }

    async fn resume_job(&self, job: ImportJob) -> Result<ImportJob, ImportRunError> {
        let tally = RowTally::resume(job.succeeded_rows, job.failed_rows, job.row_errors.clone());
        self.run_job(job, tally).await
    }

    async fn run_job(&self, job: ImportJob, tally: RowTally) -> Result<ImportJob, ImportRunError> {
        let path = self.config.uploads_dir.join(&job.stored_path);
        let mut source = match CsvRowSource::open(&path) {
            Ok(source) => source,
            Err(e) => {
                return self
                    .finalize_failed(&job, &tally, format!("import file unreadable: {}", e))
                    .await;
            }
        };

        if tally.processed() > 0 {
            if let Err(e) = source.skip_rows(tally.processed()) {
                return self
                    .finalize_failed(&job, &tally, format!("import file unreadable: {}", e))
                    .await;
            }
        }

        self.run_rows(&job, &mut source, tally).await
    }

    /// Process every remaining row of a claimed job and finalize it.
    async fn run_rows(
        &self,
        job: &ImportJob,
        source: &mut dyn RowSource,
        mut tally: RowTally,
    ) -> Result<ImportJob, ImportRunError> {
        let resolved = match resolve_mapping(&job.mapping) {
            Ok(resolved) => resolved,
            Err(e) => {
                // Submission rejects unresolvable mappings, so this only
                // covers a mapping that went bad in storage afterwards.
                return self.finalize_failed(job, &tally, e.to_string()).await;
            }
        };

        if job.cancel_requested || self.cancel_registry.is_requested(job.id) {
            return self
                .finalize_failed(job, &tally, CANCELLED_BY_USER.to_string())
                .await;
        }

        let mut breaker = CircuitBreaker::new(self.config.circuit_breaker_row_failures);

        loop {
            if self.cancel_registry.is_requested(job.id) {
                return self
                    .finalize_failed(job, &tally, CANCELLED_BY_USER.to_string())
                    .await;
            }

            let raw = match source.next_row() {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(e) => {
                    // The file itself is broken. Everything processed so far
                    // stands.
                    return self
                        .finalize_failed(job, &tally, format!("import file unreadable: {}", e))
                        .await;
                }
            };

            self.process_row(job, &resolved, raw, &mut tally, &mut breaker)
                .await;
            record_rows_processed(1);

            if breaker.tripped() {
                let reason = format!(
                    "aborted after {} consecutive identical persistence failures: {}",
                    breaker.streak,
                    breaker.last_message()
                );
                return self.finalize_failed(job, &tally, reason).await;
            }

            if tally.processed() % self.config.progress_flush_rows == 0 {
                let write = self
                    .ledger
                    .record_progress(job.id, &tally.snapshot(self.config.max_recorded_row_errors))
                    .await?;
                if write.cancel_requested {
                    return self
                        .finalize_failed(job, &tally, CANCELLED_BY_USER.to_string())
                        .await;
                }
            }
        }

        let error_report_path = self.write_error_report(job, &tally);
        let finished = self
            .ledger
            .finalize(
                job.id,
                JobOutcome::Completed {
                    progress: tally.snapshot(self.config.max_recorded_row_errors),
                    error_report_path,
                },
            )
            .await?;
        self.cancel_registry.clear(job.id);
        record_import_completed();
        Ok(finished)
    }

    /// Run one row through projection, validation, duplicate detection and
    /// persistence, recording the outcome in the tally.
    async fn process_row(
        &self,
        job: &ImportJob,
        mapping: &ResolvedMapping,
        raw: RawRow,
        tally: &mut RowTally,
        breaker: &mut CircuitBreaker,
    ) {
        let row = raw.row;
        let draft = project_row(&raw, mapping);

        let record = match validate_draft(&draft, job.clinic_id, job.id) {
            Ok(record) => record,
            Err(e) => {
                tally.record_failure(row, e.message());
                return;
            }
        };

        if self.config.duplicate_detection {
            if let Some(signature) = DuplicateSignature::of(&record) {
                match self.case_store.find_similar_case(&signature).await {
                    Ok(Some(existing)) => {
                        tally.record_failure(
                            row,
                            format!("duplicate of existing case {}", existing.id),
                        );
                        return;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        let message = e.to_string();
                        tally.record_failure(row, message.clone());
                        breaker.observe_failure(&message);
                        return;
                    }
                }
            }
        }

        match self.case_store.create_case(record).await {
            Ok(_) => {
                tally.record_success();
                breaker.observe_success();
            }
            Err(e) => {
                let message = e.to_string();
                tally.record_failure(row, message.clone());
                breaker.observe_failure(&message);
            }
        }
    }

    async fn finalize_failed(
        &self,
        job: &ImportJob,
        tally: &RowTally,
        reason: String,
    ) -> Result<ImportJob, ImportRunError> {
        warn!(job_id = %job.job_id, reason = %reason, "Import job failed");
        let error_report_path = self.write_error_report(job, tally);
        let finished = self
            .ledger
            .finalize(
                job.id,
                JobOutcome::Failed {
                    reason,
                    progress: tally.snapshot(self.config.max_recorded_row_errors),
                    error_report_path,
                },
            )
            .await?;
        self.cancel_registry.clear(job.id);
        record_import_failed();
        Ok(finished)
    }

    /// Write the per-row failure report when the run recorded any failures.
    ///
    /// The artifact carries every recorded failure, not just the capped list
    /// stored on the job. Returns the filename within the reports directory,
    /// or None when there is nothing to report or the write failed.
    fn write_error_report(&self, job: &ImportJob, tally: &RowTally) -> Option<String> {
        if tally.errors().is_empty() {
            return None;
        }

        let filename = format!(
            "import_errors_{}_{}.csv",
            job.job_id,
            Utc::now().format("%Y%m%d%H%M%S")
        );
        let path = self.config.reports_dir.join(&filename);

        // BOM keeps spreadsheet tools from mangling the header.
        let mut content = String::from("\u{feff}row,message\n");
        for error in tally.errors() {
            content.push_str(&format!("{},{}\n", error.row, escape_csv(&error.message)));
        }

        match write_file(&path, &content) {
            Ok(()) => Some(filename),
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "Failed to write import error report");
                None
            }
        }
    }
}

fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
