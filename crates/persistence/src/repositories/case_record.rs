//! Case record repository for database operations.
//!
//! Backs the domain [`CaseStore`] with PostgreSQL. Store failures are
//! classified so the import worker can distinguish a row that collides with
//! existing data from a database that is down.

use async_trait::async_trait;
use domain::models::{CaseRecord, DuplicateSignature, NewCaseRecord};
use domain::services::{CaseStore, CaseStoreError};
use sqlx::PgPool;

use crate::entities::CaseRecordEntity;
use crate::metrics::QueryTimer;

/// Repository for case record database operations.
#[derive(Clone)]
pub struct CaseRecordRepository {
    pool: PgPool,
}

impl CaseRecordRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CaseStore for CaseRecordRepository {
    async fn create_case(&self, record: NewCaseRecord) -> Result<CaseRecord, CaseStoreError> {
        let timer = QueryTimer::new("create_case_record");
        let entity = sqlx::query_as::<_, CaseRecordEntity>(
            r#"
            INSERT INTO case_records (clinic_id, patient_name, species, breed, sex,
                                      age_months, weight_kg, diagnosis_date, tumor_type,
                                      tumor_site, microchip, notes, source_import_job_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, clinic_id, patient_name, species, breed, sex, age_months,
                      weight_kg, diagnosis_date, tumor_type, tumor_site, microchip,
                      notes, source_import_job_id, created_at
            "#,
        )
        .bind(record.clinic_id)
        .bind(&record.patient_name)
        .bind(&record.species)
        .bind(&record.breed)
        .bind(&record.sex)
        .bind(record.age_months)
        .bind(record.weight_kg)
        .bind(record.diagnosis_date)
        .bind(&record.tumor_type)
        .bind(&record.tumor_site)
        .bind(&record.microchip)
        .bind(&record.notes)
        .bind(record.source_import_job_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_store_error)?;
        timer.record();

        Ok(entity_to_domain(entity))
    }

    async fn find_similar_case(
        &self,
        signature: &DuplicateSignature,
    ) -> Result<Option<CaseRecord>, CaseStoreError> {
        let timer = QueryTimer::new("find_similar_case");
        let entity = sqlx::query_as::<_, CaseRecordEntity>(
            r#"
            SELECT id, clinic_id, patient_name, species, breed, sex, age_months,
                   weight_kg, diagnosis_date, tumor_type, tumor_site, microchip,
                   notes, source_import_job_id, created_at
            FROM case_records
            WHERE clinic_id = $1
              AND diagnosis_date = $2
              AND LOWER(TRIM(species)) = $3
              AND patient_name IS NOT NULL
              AND LOWER(TRIM(patient_name)) = $4
            LIMIT 1
            "#,
        )
        .bind(signature.clinic_id)
        .bind(signature.diagnosis_date)
        .bind(&signature.species)
        .bind(&signature.patient_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_store_error)?;
        timer.record();

        Ok(entity.map(entity_to_domain))
    }
}

fn map_store_error(err: sqlx::Error) -> CaseStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            // PostgreSQL error code 23505 = unique_violation
            if db_err.code().as_deref() == Some("23505") {
                CaseStoreError::Conflict(db_err.message().to_string())
            } else {
                CaseStoreError::Backend(db_err.to_string())
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            CaseStoreError::Unavailable(err.to_string())
        }
        _ => CaseStoreError::Backend(err.to_string()),
    }
}

fn entity_to_domain(entity: CaseRecordEntity) -> CaseRecord {
    CaseRecord {
        id: entity.id,
        clinic_id: entity.clinic_id,
        patient_name: entity.patient_name,
        species: entity.species,
        breed: entity.breed,
        sex: entity.sex,
        age_months: entity.age_months,
        weight_kg: entity.weight_kg,
        diagnosis_date: entity.diagnosis_date,
        tumor_type: entity.tumor_type,
        tumor_site: entity.tumor_site,
        microchip: entity.microchip,
        notes: entity.notes,
        source_import_job_id: entity.source_import_job_id,
        created_at: entity.created_at,
    }
}
