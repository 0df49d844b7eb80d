//! Import job repository for database operations.
//!
//! Backs the domain [`ImportLedger`] with PostgreSQL. Status changes use
//! guarded updates so a job can only move forward: claiming requires the job
//! to still be pending, progress writes require it to be processing and the
//! processed count to grow, and finalizing requires a legal transition.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use domain::models::{
    FieldMapping, ImportJob, ImportJobStatus, JobOutcome, NewImportJob, ProgressWrite, RowError,
    RowProgress,
};
use domain::services::{ImportLedger, LedgerError};
use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::ImportJobEntity;
use crate::metrics::QueryTimer;

/// Repository for import job database operations.
#[derive(Clone)]
pub struct ImportJobRepository {
    pool: PgPool,
}

impl ImportJobRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Generate a unique job ID.
    pub fn generate_job_id() -> String {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; 12] = rng.gen();
        let encoded = URL_SAFE.encode(random_bytes);
        format!("import_{}", encoded)
    }
}

#[async_trait]
impl ImportLedger for ImportJobRepository {
    async fn create(&self, new_job: NewImportJob) -> Result<ImportJob, LedgerError> {
        let job_id = Self::generate_job_id();
        let mapping = serde_json::to_value(&new_job.mapping)
            .map_err(|e| LedgerError::Backend(e.to_string()))?;

        let timer = QueryTimer::new("create_import_job");
        let entity = sqlx::query_as::<_, ImportJobEntity>(
            r#"
            INSERT INTO import_jobs (job_id, clinic_id, submitted_by, source_filename,
                                     stored_path, source_checksum, mapping, total_rows)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, job_id, clinic_id, submitted_by, source_filename, stored_path,
                      source_checksum, mapping, status, total_rows, processed_rows,
                      succeeded_rows, failed_rows, row_errors, failure_reason,
                      error_report_path, cancel_requested, created_at, started_at, completed_at
            "#,
        )
        .bind(&job_id)
        .bind(new_job.clinic_id)
        .bind(new_job.submitted_by)
        .bind(&new_job.source_filename)
        .bind(&new_job.stored_path)
        .bind(&new_job.source_checksum)
        .bind(&mapping)
        .bind(new_job.total_rows)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;
        timer.record();

        Ok(entity_to_domain(entity))
    }

    async fn find(&self, id: Uuid) -> Result<Option<ImportJob>, LedgerError> {
        let entity = sqlx::query_as::<_, ImportJobEntity>(
            r#"
            SELECT id, job_id, clinic_id, submitted_by, source_filename, stored_path,
                   source_checksum, mapping, status, total_rows, processed_rows,
                   succeeded_rows, failed_rows, row_errors, failure_reason,
                   error_report_path, cancel_requested, created_at, started_at, completed_at
            FROM import_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;

        Ok(entity.map(entity_to_domain))
    }

    async fn find_by_job_id(
        &self,
        clinic_id: Uuid,
        job_id: &str,
    ) -> Result<Option<ImportJob>, LedgerError> {
        let entity = sqlx::query_as::<_, ImportJobEntity>(
            r#"
            SELECT id, job_id, clinic_id, submitted_by, source_filename, stored_path,
                   source_checksum, mapping, status, total_rows, processed_rows,
                   succeeded_rows, failed_rows, row_errors, failure_reason,
                   error_report_path, cancel_requested, created_at, started_at, completed_at
            FROM import_jobs
            WHERE job_id = $1 AND clinic_id = $2
            "#,
        )
        .bind(job_id)
        .bind(clinic_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;

        Ok(entity.map(entity_to_domain))
    }

    async fn find_pending(&self, limit: i64) -> Result<Vec<ImportJob>, LedgerError> {
        let entities = sqlx::query_as::<_, ImportJobEntity>(
            r#"
            SELECT id, job_id, clinic_id, submitted_by, source_filename, stored_path,
                   source_checksum, mapping, status, total_rows, processed_rows,
                   succeeded_rows, failed_rows, row_errors, failure_reason,
                   error_report_path, cancel_requested, created_at, started_at, completed_at
            FROM import_jobs
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;

        Ok(entities.into_iter().map(entity_to_domain).collect())
    }

    async fn find_resumable(&self, limit: i64) -> Result<Vec<ImportJob>, LedgerError> {
        let entities = sqlx::query_as::<_, ImportJobEntity>(
            r#"
            SELECT id, job_id, clinic_id, submitted_by, source_filename, stored_path,
                   source_checksum, mapping, status, total_rows, processed_rows,
                   succeeded_rows, failed_rows, row_errors, failure_reason,
                   error_report_path, cancel_requested, created_at, started_at, completed_at
            FROM import_jobs
            WHERE status = 'processing'
            ORDER BY started_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;

        Ok(entities.into_iter().map(entity_to_domain).collect())
    }

    async fn list_for_clinic(
        &self,
        clinic_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ImportJob>, LedgerError> {
        let entities = sqlx::query_as::<_, ImportJobEntity>(
            r#"
            SELECT id, job_id, clinic_id, submitted_by, source_filename, stored_path,
                   source_checksum, mapping, status, total_rows, processed_rows,
                   succeeded_rows, failed_rows, row_errors, failure_reason,
                   error_report_path, cancel_requested, created_at, started_at, completed_at
            FROM import_jobs
            WHERE clinic_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(clinic_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;

        Ok(entities.into_iter().map(entity_to_domain).collect())
    }

    async fn count_for_clinic(&self, clinic_id: Uuid) -> Result<i64, LedgerError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM import_jobs WHERE clinic_id = $1
            "#,
        )
        .bind(clinic_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;

        Ok(count)
    }

    async fn claim(&self, id: Uuid) -> Result<bool, LedgerError> {
        let timer = QueryTimer::new("claim_import_job");
        let result = sqlx::query(
            r#"
            UPDATE import_jobs
            SET status = 'processing', started_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;
        timer.record();

        Ok(result.rows_affected() > 0)
    }

    async fn record_progress(
        &self,
        id: Uuid,
        progress: &RowProgress,
    ) -> Result<ProgressWrite, LedgerError> {
        let row_errors = serde_json::to_value(&progress.row_errors)
            .map_err(|e| LedgerError::Backend(e.to_string()))?;

        let timer = QueryTimer::new("record_import_progress");
        let applied = sqlx::query_scalar::<_, bool>(
            r#"
            UPDATE import_jobs
            SET processed_rows = $2, succeeded_rows = $3, failed_rows = $4, row_errors = $5
            WHERE id = $1 AND status = 'processing' AND processed_rows < $2
            RETURNING cancel_requested
            "#,
        )
        .bind(id)
        .bind(progress.processed_rows)
        .bind(progress.succeeded_rows)
        .bind(progress.failed_rows)
        .bind(&row_errors)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;
        timer.record();

        if let Some(cancel_requested) = applied {
            return Ok(ProgressWrite {
                applied: true,
                cancel_requested,
            });
        }

        // Stale snapshot or a job no longer processing. Still surface the
        // cancellation flag so the caller can react to it.
        let cancel_requested = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT cancel_requested FROM import_jobs WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?
        .ok_or(LedgerError::NotFound)?;

        Ok(ProgressWrite {
            applied: false,
            cancel_requested,
        })
    }

    async fn finalize(&self, id: Uuid, outcome: JobOutcome) -> Result<ImportJob, LedgerError> {
        let to = outcome.status();
        let progress = outcome.progress();
        let row_errors = serde_json::to_value(&progress.row_errors)
            .map_err(|e| LedgerError::Backend(e.to_string()))?;

        // Completed is only reachable from processing; failed also covers
        // jobs rejected before they were ever claimed.
        let query = match to {
            ImportJobStatus::Completed => {
                r#"
                UPDATE import_jobs
                SET status = 'completed', processed_rows = $2, succeeded_rows = $3,
                    failed_rows = $4, row_errors = $5, failure_reason = $6,
                    error_report_path = $7, completed_at = NOW()
                WHERE id = $1 AND status = 'processing'
                RETURNING id, job_id, clinic_id, submitted_by, source_filename, stored_path,
                          source_checksum, mapping, status, total_rows, processed_rows,
                          succeeded_rows, failed_rows, row_errors, failure_reason,
                          error_report_path, cancel_requested, created_at, started_at, completed_at
                "#
            }
            _ => {
                r#"
                UPDATE import_jobs
                SET status = 'failed', processed_rows = $2, succeeded_rows = $3,
                    failed_rows = $4, row_errors = $5, failure_reason = $6,
                    error_report_path = $7, completed_at = NOW()
                WHERE id = $1 AND status IN ('pending', 'processing')
                RETURNING id, job_id, clinic_id, submitted_by, source_filename, stored_path,
                          source_checksum, mapping, status, total_rows, processed_rows,
                          succeeded_rows, failed_rows, row_errors, failure_reason,
                          error_report_path, cancel_requested, created_at, started_at, completed_at
                "#
            }
        };

        let timer = QueryTimer::new("finalize_import_job");
        let entity = sqlx::query_as::<_, ImportJobEntity>(query)
            .bind(id)
            .bind(progress.processed_rows)
            .bind(progress.succeeded_rows)
            .bind(progress.failed_rows)
            .bind(&row_errors)
            .bind(outcome.failure_reason())
            .bind(outcome.error_report_path())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LedgerError::Backend(e.to_string()))?;
        timer.record();

        match entity {
            Some(entity) => Ok(entity_to_domain(entity)),
            None => {
                let current = self.find(id).await?.ok_or(LedgerError::NotFound)?;
                Err(LedgerError::InvalidTransition {
                    from: current.status,
                    to,
                })
            }
        }
    }

    async fn request_cancel(&self, clinic_id: Uuid, job_id: &str) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE import_jobs
            SET cancel_requested = TRUE
            WHERE job_id = $1 AND clinic_id = $2 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(job_id)
        .bind(clinic_id)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

fn entity_to_domain(entity: ImportJobEntity) -> ImportJob {
    let status = entity
        .status
        .parse::<ImportJobStatus>()
        .unwrap_or(ImportJobStatus::Pending);
    let mapping: FieldMapping = serde_json::from_value(entity.mapping).unwrap_or_default();
    let row_errors: Vec<RowError> = serde_json::from_value(entity.row_errors).unwrap_or_default();

    ImportJob {
        id: entity.id,
        job_id: entity.job_id,
        clinic_id: entity.clinic_id,
        submitted_by: entity.submitted_by,
        source_filename: entity.source_filename,
        stored_path: entity.stored_path,
        source_checksum: entity.source_checksum,
        mapping,
        status,
        total_rows: entity.total_rows,
        processed_rows: entity.processed_rows,
        succeeded_rows: entity.succeeded_rows,
        failed_rows: entity.failed_rows,
        row_errors,
        failure_reason: entity.failure_reason,
        error_report_path: entity.error_report_path,
        cancel_requested: entity.cancel_requested,
        created_at: entity.created_at,
        started_at: entity.started_at,
        completed_at: entity.completed_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_job_id() {
        let job_id = ImportJobRepository::generate_job_id();
        assert!(job_id.starts_with("import_"));
        assert!(job_id.len() > 10);

        // Generate multiple and ensure uniqueness
        let job_id2 = ImportJobRepository::generate_job_id();
        assert_ne!(job_id, job_id2);
    }

    #[test]
    fn test_entity_to_domain_parses_status_and_errors() {
        let now = chrono::Utc::now();
        let entity = ImportJobEntity {
            id: Uuid::new_v4(),
            job_id: "import_abc".to_string(),
            clinic_id: Uuid::new_v4(),
            submitted_by: Uuid::new_v4(),
            source_filename: "cases.csv".to_string(),
            stored_path: "/uploads/import_abc.csv".to_string(),
            source_checksum: "00ff".to_string(),
            mapping: serde_json::json!({"Name": "patientName"}),
            status: "processing".to_string(),
            total_rows: 10,
            processed_rows: 4,
            succeeded_rows: 3,
            failed_rows: 1,
            row_errors: serde_json::json!([{"row": 2, "message": "species is required"}]),
            failure_reason: None,
            error_report_path: None,
            cancel_requested: false,
            created_at: now,
            started_at: Some(now),
            completed_at: None,
        };

        let job = entity_to_domain(entity);
        assert_eq!(job.status, ImportJobStatus::Processing);
        assert_eq!(job.row_errors.len(), 1);
        assert_eq!(job.row_errors[0].row, 2);
    }

    #[test]
    fn test_entity_to_domain_defaults_unknown_status() {
        let now = chrono::Utc::now();
        let entity = ImportJobEntity {
            id: Uuid::new_v4(),
            job_id: "import_abc".to_string(),
            clinic_id: Uuid::new_v4(),
            submitted_by: Uuid::new_v4(),
            source_filename: "cases.csv".to_string(),
            stored_path: "/uploads/import_abc.csv".to_string(),
            source_checksum: "00ff".to_string(),
            mapping: serde_json::json!({}),
            status: "archived".to_string(),
            total_rows: 0,
            processed_rows: 0,
            succeeded_rows: 0,
            failed_rows: 0,
            row_errors: serde_json::json!([]),
            failure_reason: None,
            error_report_path: None,
            cancel_requested: false,
            created_at: now,
            started_at: None,
            completed_at: None,
        };

        assert_eq!(entity_to_domain(entity).status, ImportJobStatus::Pending);
    }
}
