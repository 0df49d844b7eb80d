//! Common test utilities for integration tests.
//!
//! This module provides helper functions and fixtures for running integration tests
//! against a real PostgreSQL database. Each test calls [`try_test_pool`] first and
//! returns early when `TEST_DATABASE_URL` is not set, so the suite stays green on
//! machines without PostgreSQL. The suite assumes it is the only client of the
//! test database while it runs.

// Allow dead code in this module - these are helper utilities that may not be used
// by all integration tests but are intentionally available for future use.
#![allow(dead_code)]

use axum::Router;
use onco_registry_api::services::{CancelRegistry, ImportRunnerConfig, ImportRunnerService};
use onco_registry_api::{app::create_app, config::Config};
use persistence::repositories::{CaseRecordRepository, ImportJobRepository};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Create a test database pool, or `None` when `TEST_DATABASE_URL` is unset.
pub async fn try_test_pool() -> Option<PgPool> {
    let database_url = std::env::var("TEST_DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    Some(pool)
}

/// Run migrations on the test database.
pub async fn run_migrations(pool: &PgPool) {
    // Read all migration files in order
    let migration_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("persistence/src/migrations");

    let mut entries: Vec<_> = std::fs::read_dir(&migration_dir)
        .expect("Failed to read migrations directory")
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|ext| ext == "sql").unwrap_or(false))
        .collect();

    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let sql = std::fs::read_to_string(entry.path()).expect("Failed to read migration file");

        sqlx::raw_sql(&sql).execute(pool).await.unwrap_or_else(|_| {
            // Migration might already be applied, ignore errors
            sqlx::postgres::PgQueryResult::default()
        });
    }
}

/// Scratch directory shared by every test in this process.
///
/// Tests run concurrently in one binary, and any runner pass may pick up any
/// pending job, so uploads must land where every runner config can find them.
fn scratch_dir() -> &'static std::path::Path {
    static SCRATCH: std::sync::OnceLock<std::path::PathBuf> = std::sync::OnceLock::new();
    SCRATCH.get_or_init(|| {
        std::env::temp_dir().join(format!("onco-registry-tests-{}", Uuid::new_v4().simple()))
    })
}

/// Test configuration writing uploads and reports under the process scratch directory.
pub fn test_config() -> Config {
    let scratch = scratch_dir();

    Config {
        server: onco_registry_api::config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Use random port
            request_timeout_secs: 30,
            max_body_size: 1_048_576,
        },
        database: onco_registry_api::config::DatabaseConfig {
            url: std::env::var("TEST_DATABASE_URL").unwrap_or_default(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout_secs: 10,
            idle_timeout_secs: 600,
        },
        logging: onco_registry_api::config::LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: onco_registry_api::config::SecurityConfig {
            cors_origins: vec![],
            rate_limit_per_minute: 0, // Disable rate limiting for tests
        },
        imports: onco_registry_api::config::ImportsConfig {
            poll_batch_size: 5,
            poll_interval_secs: 10,
            progress_flush_rows: 100,
            max_recorded_row_errors: 100,
            circuit_breaker_row_failures: 25,
            duplicate_detection: true,
            max_rows: 50,
            uploads_dir: scratch.join("uploads").to_string_lossy().into_owned(),
            reports_dir: scratch.join("reports").to_string_lossy().into_owned(),
        },
    }
}

/// Create a test application router.
pub fn create_test_app(config: Config, pool: PgPool, cancel_registry: CancelRegistry) -> Router {
    create_app(config, pool, cancel_registry)
}

/// Drive the import runner once, the way the background job does each tick.
pub async fn run_import_jobs(
    pool: &PgPool,
    config: &Config,
    cancel_registry: &CancelRegistry,
) -> u32 {
    let runner = ImportRunnerService::new(
        Arc::new(ImportJobRepository::new(pool.clone())),
        Arc::new(CaseRecordRepository::new(pool.clone())),
        cancel_registry.clone(),
        ImportRunnerConfig::from(&config.imports),
    );

    runner
        .process_pending_jobs(config.imports.poll_batch_size)
        .await
        .expect("Import runner failed")
}

/// Run the import runner until the given job reaches a terminal state, then
/// return its final view.
///
/// A single pass handles a bounded batch, so a backlog left by other tests can
/// push a fresh job past the first pass.
pub async fn process_job_to_completion(
    app: &Router,
    pool: &PgPool,
    config: &Config,
    cancel_registry: &CancelRegistry,
    clinic: &TestClinic,
    job_id: &str,
) -> serde_json::Value {
    for _ in 0..10 {
        run_import_jobs(pool, config, cancel_registry).await;

        let job = get_import_status(app, clinic, job_id).await;
        let status = job["status"].as_str().unwrap_or_default();
        if status == "completed" || status == "failed" {
            return job;
        }
    }

    panic!("Import job {} did not reach a terminal state", job_id);
}

/// Tenant context for tests. Every test uses a fresh clinic so concurrently
/// running tests never see each other's jobs.
#[derive(Debug, Clone)]
pub struct TestClinic {
    pub clinic_id: Uuid,
    pub user_id: Uuid,
}

impl TestClinic {
    pub fn new() -> Self {
        Self {
            clinic_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        }
    }
}

impl Default for TestClinic {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove one clinic's rows from the database.
pub async fn cleanup_clinic_data(pool: &PgPool, clinic_id: Uuid) {
    sqlx::query("DELETE FROM case_records WHERE clinic_id = $1")
        .bind(clinic_id)
        .execute(pool)
        .await
        .ok();
    sqlx::query("DELETE FROM import_jobs WHERE clinic_id = $1")
        .bind(clinic_id)
        .execute(pool)
        .await
        .ok();
}

/// Column mapping covering the headers [`sample_csv`] emits.
pub fn sample_mapping() -> serde_json::Value {
    serde_json::json!({
        "Patient": "patientName",
        "Species": "species",
        "Breed": "breed",
        "Diagnosis Date": "diagnosisDate",
        "Tumor Type": "tumorType",
    })
}

/// Build CSV content with `rows` valid data rows.
///
/// Patient names carry the row index, so no two rows share a duplicate
/// signature.
pub fn sample_csv(rows: usize) -> String {
    use fake::faker::name::en::FirstName;
    use fake::Fake;

    let mut content = String::from("Patient,Species,Breed,Diagnosis Date,Tumor Type\n");
    for i in 0..rows {
        let name: String = FirstName().fake();
        content.push_str(&format!(
            "{}-{},canine,labrador,2024-03-{:02},lymphoma\n",
            name,
            i,
            (i % 28) + 1
        ));
    }
    content
}

/// Build a JSON request with clinic headers.
pub fn json_request_with_clinic(
    method: axum::http::Method,
    uri: &str,
    body: serde_json::Value,
    clinic: &TestClinic,
) -> axum::http::Request<axum::body::Body> {
    use axum::{
        body::Body,
        http::{header, Request},
    };

    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Clinic-Id", clinic.clinic_id.to_string())
        .header("X-User-Id", clinic.user_id.to_string())
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a GET request with clinic headers.
pub fn get_request_with_clinic(
    uri: &str,
    clinic: &TestClinic,
) -> axum::http::Request<axum::body::Body> {
    use axum::{body::Body, http::Request};

    Request::builder()
        .method(axum::http::Method::GET)
        .uri(uri)
        .header("X-Clinic-Id", clinic.clinic_id.to_string())
        .header("X-User-Id", clinic.user_id.to_string())
        .body(Body::empty())
        .unwrap()
}

/// Build a bodyless POST request with clinic headers.
pub fn post_request_with_clinic(
    uri: &str,
    clinic: &TestClinic,
) -> axum::http::Request<axum::body::Body> {
    use axum::{body::Body, http::Request};

    Request::builder()
        .method(axum::http::Method::POST)
        .uri(uri)
        .header("X-Clinic-Id", clinic.clinic_id.to_string())
        .header("X-User-Id", clinic.user_id.to_string())
        .body(Body::empty())
        .unwrap()
}

/// Submit an import via the API and return the accepted job view.
pub async fn submit_test_import(
    app: &Router,
    clinic: &TestClinic,
    mapping: serde_json::Value,
    content: &str,
) -> serde_json::Value {
    use axum::http::{Method, StatusCode};
    use tower::ServiceExt;

    let request = json_request_with_clinic(
        Method::POST,
        "/api/v1/imports",
        serde_json::json!({
            "fileName": "cases.csv",
            "mapping": mapping,
            "content": content,
        }),
        clinic,
    );

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = parse_response_body(response).await;

    if status != StatusCode::ACCEPTED {
        panic!("Import submission failed with status: {}, body: {}", status, body);
    }

    body
}

/// Fetch one job's current view via the API.
pub async fn get_import_status(app: &Router, clinic: &TestClinic, job_id: &str) -> serde_json::Value {
    use tower::ServiceExt;

    let request = get_request_with_clinic(&format!("/api/v1/imports/{}", job_id), clinic);
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    parse_response_body(response).await
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
}
