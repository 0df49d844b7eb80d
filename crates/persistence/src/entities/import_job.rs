//! Import job entity.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database entity for bulk import jobs.
#[derive(Debug, Clone, FromRow)]
pub struct ImportJobEntity {
    /// Unique database identifier.
    pub id: Uuid,

    /// User-facing job identifier (import_<random>).
    pub job_id: String,

    /// Clinic this import belongs to.
    pub clinic_id: Uuid,

    /// User who submitted the import.
    pub submitted_by: Uuid,

    /// Original name of the uploaded file.
    pub source_filename: String,

    /// Where the uploaded file is stored on disk.
    pub stored_path: String,

    /// SHA-256 checksum of the uploaded file.
    pub source_checksum: String,

    /// Submitted column mapping (header -> canonical field).
    pub mapping: serde_json::Value,

    /// Current job status.
    pub status: String,

    /// Number of data rows in the file.
    pub total_rows: i64,

    /// Rows processed so far.
    pub processed_rows: i64,

    /// Rows that produced a case record.
    pub succeeded_rows: i64,

    /// Rows rejected by validation or persistence.
    pub failed_rows: i64,

    /// Recorded per-row errors, capped by configuration.
    pub row_errors: serde_json::Value,

    /// Job-level failure reason, when the job failed.
    pub failure_reason: Option<String>,

    /// Path of the generated error report, when one exists.
    pub error_report_path: Option<String>,

    /// Whether a cancellation has been requested.
    pub cancel_requested: bool,

    /// When the job was submitted.
    pub created_at: DateTime<Utc>,

    /// When processing began.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}
