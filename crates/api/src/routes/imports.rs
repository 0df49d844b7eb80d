//! Bulk case import route handlers.
//!
//! Submission is asynchronous: a submit stores the upload, creates a ledger
//! entry and returns 202 immediately. The background runner picks the job up
//! from there; clients poll the status endpoints.

use std::fs;
use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use uuid::Uuid;
use validator::Validate;

use persistence::repositories::ImportJobRepository;
use shared::checksum::sha256_hex;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::ClinicContext;
use crate::services::count_data_rows;

use domain::models::{
    resolve_mapping, FieldMapping, ImportJobResponse, ImportPagination, JobOutcome,
    ListImportsQuery, ListImportsResponse, NewImportJob, RowProgress, SubmitImportRequest,
};
use domain::services::ImportLedger;

/// Submit a new bulk import.
///
/// POST /api/v1/imports
///
/// Returns 202 with the created job. A job whose column mapping cannot be
/// resolved is created and immediately finalized as failed, with every
/// mapping problem listed, so the submission is still inspectable.
#[axum::debug_handler]
pub async fn submit_import(
    State(state): State<AppState>,
    context: ClinicContext,
    Json(request): Json<SubmitImportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;

    // Strip a UTF-8 BOM so the first header cell maps cleanly.
    let content = request.content.trim_start_matches('\u{feff}');

    let total_rows = count_data_rows(content)
        .map_err(|e| ApiError::Validation(format!("Invalid CSV content: {}", e)))?;

    if total_rows > state.config.imports.max_rows {
        return Err(ApiError::Validation(format!(
            "File has {} data rows, the limit is {}",
            total_rows, state.config.imports.max_rows
        )));
    }

    let uploads_dir = PathBuf::from(&state.config.imports.uploads_dir);
    let stored_path = format!("upload_{}.csv", Uuid::new_v4());
    fs::create_dir_all(&uploads_dir)
        .and_then(|_| fs::write(uploads_dir.join(&stored_path), content))
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to store import upload");
            ApiError::Internal("Failed to store upload".to_string())
        })?;

    let mapping = FieldMapping::new(request.mapping.clone());
    let ledger = ImportJobRepository::new(state.pool.clone());

    let job = ledger
        .create(NewImportJob {
            clinic_id: context.clinic_id,
            submitted_by: context.user_id,
            source_filename: request.file_name.clone(),
            stored_path,
            source_checksum: sha256_hex(content.as_bytes()),
            mapping: mapping.clone(),
            total_rows,
        })
        .await?;

    let job = match resolve_mapping(&mapping) {
        Ok(_) => job,
        Err(e) => {
            ledger
                .finalize(
                    job.id,
                    JobOutcome::Failed {
                        reason: e.to_string(),
                        progress: RowProgress::default(),
                        error_report_path: None,
                    },
                )
                .await?
        }
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(ImportJobResponse::from_job(&job)),
    ))
}

/// List the clinic's import jobs, newest first.
///
/// GET /api/v1/imports?page=1&per_page=50
#[axum::debug_handler]
pub async fn list_imports(
    State(state): State<AppState>,
    context: ClinicContext,
    Query(query): Query<ListImportsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let ledger = ImportJobRepository::new(state.pool.clone());

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(50).clamp(1, 100);
    let offset = ((page - 1) as i64) * (per_page as i64);

    let jobs = ledger
        .list_for_clinic(context.clinic_id, per_page as i64, offset)
        .await?;
    let total = ledger.count_for_clinic(context.clinic_id).await?;
    let total_pages = ((total as f64) / (per_page as f64)).ceil() as i32;

    let response = ListImportsResponse {
        data: jobs.iter().map(ImportJobResponse::from_job).collect(),
        pagination: ImportPagination {
            page,
            per_page,
            total,
            total_pages,
        },
    };

    Ok((StatusCode::OK, Json(response)))
}

/// Get one import job by its public id.
///
/// GET /api/v1/imports/{job_id}
#[axum::debug_handler]
pub async fn get_import(
    State(state): State<AppState>,
    context: ClinicContext,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ledger = ImportJobRepository::new(state.pool.clone());
    let job = ledger
        .find_by_job_id(context.clinic_id, &job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Import job not found".to_string()))?;

    Ok((StatusCode::OK, Json(ImportJobResponse::from_job(&job))))
}

/// Request cancellation of a running import.
///
/// POST /api/v1/imports/{job_id}/cancel
///
/// Returns 202: cancellation is cooperative, the worker stops between rows.
/// A job that already reached a terminal status returns 409.
#[axum::debug_handler]
pub async fn cancel_import(
    State(state): State<AppState>,
    context: ClinicContext,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ledger = ImportJobRepository::new(state.pool.clone());
    let job = ledger
        .find_by_job_id(context.clinic_id, &job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Import job not found".to_string()))?;

    if job.status.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "Import job is already {}",
            job.status
        )));
    }

    if !ledger.request_cancel(context.clinic_id, &job_id).await? {
        // The job finished between the lookup and the flag write.
        return Err(ApiError::Conflict(
            "Import job already finished".to_string(),
        ));
    }
    state.cancel_registry.request(job.id);

    let job = ledger
        .find_by_job_id(context.clinic_id, &job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Import job not found".to_string()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ImportJobResponse::from_job(&job)),
    ))
}

/// Download the per-row error report of a finished import.
///
/// GET /api/v1/imports/{job_id}/error-report
///
/// Streams the stored CSV artifact. 404 when the job recorded no failures.
#[axum::debug_handler]
pub async fn download_error_report(
    State(state): State<AppState>,
    context: ClinicContext,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let ledger = ImportJobRepository::new(state.pool.clone());
    let job = ledger
        .find_by_job_id(context.clinic_id, &job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Import job not found".to_string()))?;

    let file_name = job
        .error_report_path
        .ok_or_else(|| ApiError::NotFound("No error report for this job".to_string()))?;

    let reports_dir = PathBuf::from(&state.config.imports.reports_dir);
    let full_path = reports_dir.join(&file_name);

    let file = File::open(&full_path).await.map_err(|e| {
        tracing::error!(
            error = %e,
            path = %full_path.display(),
            "Failed to open error report file"
        );
        ApiError::NotFound("Error report file not found on disk".to_string())
    })?;

    let metadata = file.metadata().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to get error report metadata");
        ApiError::Internal("Failed to read error report file".to_string())
    })?;

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "text/csv")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        )
        .header(header::CONTENT_LENGTH, metadata.len())
        .body(body)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to build response");
            ApiError::Internal("Failed to build response".to_string())
        })?;

    Ok(response)
}
