//! Bulk case import job models.
//!
//! An import job is the durable ledger entry for one uploaded case file. It
//! tracks the job through its lifecycle and carries the row counters that the
//! status endpoint reports back to the clinic.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::field_mapping::FieldMapping;

/// Maximum length of an uploaded file name.
pub const MAX_SOURCE_FILENAME_LEN: usize = 255;

/// Maximum size of uploaded file content in bytes (20MB).
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Lifecycle status of an import job.
///
/// Transitions move forward only: `pending -> processing -> completed | failed`.
/// A pending job may also fail directly when its mapping is rejected at
/// submission. `completed` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ImportJobStatus {
    /// Convert to database string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the status is terminal. Terminal jobs never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a transition to `next` is allowed.
    pub fn can_transition_to(&self, next: ImportJobStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Processing) => true,
            (Self::Pending, Self::Failed) => true,
            (Self::Processing, Self::Completed) => true,
            (Self::Processing, Self::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ImportJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ImportJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ImportJobStatus::Pending),
            "processing" => Ok(ImportJobStatus::Processing),
            "completed" => Ok(ImportJobStatus::Completed),
            "failed" => Ok(ImportJobStatus::Failed),
            _ => Err(format!("Unknown import job status: {}", s)),
        }
    }
}

/// One recorded row failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    /// Data row number (1-indexed, header excluded) where the error occurred.
    pub row: i64,

    /// Error message.
    pub message: String,
}

/// An import job as stored in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    /// Internal identifier.
    pub id: Uuid,

    /// Public job identifier (format: "import_<random>").
    pub job_id: String,

    /// Clinic that owns the import.
    pub clinic_id: Uuid,

    /// User who submitted the import.
    pub submitted_by: Uuid,

    /// Original name of the uploaded file.
    pub source_filename: String,

    /// Path of the stored upload on disk.
    pub stored_path: String,

    /// SHA-256 checksum of the uploaded content (hex).
    pub source_checksum: String,

    /// Column mapping submitted with the file.
    pub mapping: FieldMapping,

    /// Current lifecycle status.
    pub status: ImportJobStatus,

    /// Number of data rows in the file.
    pub total_rows: i64,

    /// Number of rows processed so far.
    pub processed_rows: i64,

    /// Number of rows persisted as case records.
    pub succeeded_rows: i64,

    /// Number of rows that failed.
    pub failed_rows: i64,

    /// Recorded row failures (capped, the error report holds the full list).
    pub row_errors: Vec<RowError>,

    /// Reason the job failed, when status is failed.
    pub failure_reason: Option<String>,

    /// Path of the generated error report, when one exists.
    pub error_report_path: Option<String>,

    /// Whether cancellation has been requested.
    pub cancel_requested: bool,

    /// When the job was submitted.
    pub created_at: DateTime<Utc>,

    /// When processing started.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for creating an import job.
#[derive(Debug, Clone)]
pub struct NewImportJob {
    /// Clinic that owns the import.
    pub clinic_id: Uuid,

    /// User who submitted the import.
    pub submitted_by: Uuid,

    /// Original name of the uploaded file.
    pub source_filename: String,

    /// Path of the stored upload on disk.
    pub stored_path: String,

    /// SHA-256 checksum of the uploaded content (hex).
    pub source_checksum: String,

    /// Column mapping submitted with the file.
    pub mapping: FieldMapping,

    /// Number of data rows in the file.
    pub total_rows: i64,
}

/// A progress snapshot written to the ledger during processing.
///
/// Snapshots are cumulative. Writing the same snapshot twice is a no-op and
/// counters can never move backwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowProgress {
    /// Rows processed so far.
    pub processed_rows: i64,

    /// Rows persisted so far.
    pub succeeded_rows: i64,

    /// Rows failed so far.
    pub failed_rows: i64,

    /// Recorded failures so far (capped).
    pub row_errors: Vec<RowError>,
}

/// Result of writing a progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressWrite {
    /// Whether the snapshot was applied. False when it was stale or the job
    /// already left the processing status.
    pub applied: bool,

    /// Whether cancellation has been requested for the job.
    pub cancel_requested: bool,
}

/// Terminal outcome of an import job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Every row was read and processed.
    Completed {
        progress: RowProgress,
        error_report_path: Option<String>,
    },
    /// The job stopped before processing every row, or never started.
    Failed {
        reason: String,
        progress: RowProgress,
        error_report_path: Option<String>,
    },
}

impl JobOutcome {
    /// Target status of the outcome.
    pub fn status(&self) -> ImportJobStatus {
        match self {
            Self::Completed { .. } => ImportJobStatus::Completed,
            Self::Failed { .. } => ImportJobStatus::Failed,
        }
    }

    /// Final counters carried by the outcome.
    pub fn progress(&self) -> &RowProgress {
        match self {
            Self::Completed { progress, .. } => progress,
            Self::Failed { progress, .. } => progress,
        }
    }

    /// Failure reason, when the outcome is failed.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { reason, .. } => Some(reason),
        }
    }

    /// Path of the generated error report, when one exists.
    pub fn error_report_path(&self) -> Option<&str> {
        match self {
            Self::Completed {
                error_report_path, ..
            } => error_report_path.as_deref(),
            Self::Failed {
                error_report_path, ..
            } => error_report_path.as_deref(),
        }
    }
}

/// In-memory row counters accumulated while a job runs.
///
/// The processed count is always the sum of successes and failures, so the
/// tally cannot drift out of balance.
#[derive(Debug, Clone, Default)]
pub struct RowTally {
    succeeded: i64,
    failed: i64,
    errors: Vec<RowError>,
}

impl RowTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a tally from the counters an interrupted run left in the
    /// ledger, so a resumed job carries its earlier rows forward.
    pub fn resume(succeeded: i64, failed: i64, errors: Vec<RowError>) -> Self {
        Self {
            succeeded,
            failed,
            errors,
        }
    }

    /// Count one persisted row.
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    /// Count one failed row with its message.
    pub fn record_failure(&mut self, row: i64, message: impl Into<String>) {
        self.failed += 1;
        self.errors.push(RowError {
            row,
            message: message.into(),
        });
    }

    pub fn processed(&self) -> i64 {
        self.succeeded + self.failed
    }

    pub fn succeeded(&self) -> i64 {
        self.succeeded
    }

    pub fn failed(&self) -> i64 {
        self.failed
    }

    /// All recorded failures, in row order.
    pub fn errors(&self) -> &[RowError] {
        &self.errors
    }

    /// Build a ledger snapshot, keeping at most `max_recorded_errors` entries.
    pub fn snapshot(&self, max_recorded_errors: usize) -> RowProgress {
        RowProgress {
            processed_rows: self.processed(),
            succeeded_rows: self.succeeded,
            failed_rows: self.failed,
            row_errors: self.errors.iter().take(max_recorded_errors).cloned().collect(),
        }
    }
}

/// Request to submit a new import.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitImportRequest {
    /// Name of the uploaded file.
    #[validate(length(min = 1, max = 255, message = "fileName must be 1-255 characters"))]
    pub file_name: String,

    /// Column mapping from file headers to canonical case fields.
    pub mapping: HashMap<String, String>,

    /// File content.
    #[validate(length(min = 1, message = "content must not be empty"))]
    pub content: String,
}

/// Import job view returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobResponse {
    pub job_id: String,
    pub status: ImportJobStatus,
    pub source_filename: String,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub succeeded_rows: i64,
    pub failed_rows: i64,
    pub row_errors: Vec<RowError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub has_error_report: bool,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJobResponse {
    /// Build the API view of a ledger entry.
    pub fn from_job(job: &ImportJob) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            source_filename: job.source_filename.clone(),
            total_rows: job.total_rows,
            processed_rows: job.processed_rows,
            succeeded_rows: job.succeeded_rows,
            failed_rows: job.failed_rows,
            row_errors: job.row_errors.clone(),
            failure_reason: job.failure_reason.clone(),
            has_error_report: job.error_report_path.is_some(),
            cancel_requested: job.cancel_requested,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

/// Query parameters for listing a clinic's import jobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListImportsQuery {
    pub page: Option<i32>,
    pub per_page: Option<i32>,
}

/// Paginated list of import jobs.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListImportsResponse {
    pub data: Vec<ImportJobResponse>,
    pub pagination: ImportPagination,
}

/// Pagination block of a list response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPagination {
    pub page: i32,
    pub per_page: i32,
    pub total: i64,
    pub total_pages: i32,
}
