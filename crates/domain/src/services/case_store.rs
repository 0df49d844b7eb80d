//! Case record store abstraction.
//!
//! The import engine persists rows through this seam and probes it for
//! already registered cases. Failures are classified so the worker can tell
//! a bad row from a store that is down.

use async_trait::async_trait;

use crate::models::case_record::{CaseRecord, DuplicateSignature, NewCaseRecord};

/// Errors returned by case store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaseStoreError {
    /// The record collides with an existing one (unique constraint).
    #[error("case conflicts with an existing record: {0}")]
    Conflict(String),

    /// The store cannot be reached or is refusing work.
    #[error("case store unavailable: {0}")]
    Unavailable(String),

    /// Any other store failure.
    #[error("case store error: {0}")]
    Backend(String),
}

/// Store for persisted oncology cases.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Persist a new case record.
    async fn create_case(&self, record: NewCaseRecord) -> Result<CaseRecord, CaseStoreError>;

    /// Look for an existing case with the same duplicate signature.
    async fn find_similar_case(
        &self,
        signature: &DuplicateSignature,
    ) -> Result<Option<CaseRecord>, CaseStoreError>;
}

/// In-memory case store for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryCaseStore {
    cases: tokio::sync::Mutex<Vec<CaseRecord>>,
    /// When set, every create fails with this message.
    failure: Option<String>,
}

impl InMemoryCaseStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store where every write fails with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            cases: tokio::sync::Mutex::new(Vec::new()),
            failure: Some(message.into()),
        }
    }

    /// Snapshot of the stored records.
    pub async fn records(&self) -> Vec<CaseRecord> {
        self.cases.lock().await.clone()
    }

    /// Number of stored records.
    pub async fn count(&self) -> usize {
        self.cases.lock().await.len()
    }
}

#[async_trait]
impl CaseStore for InMemoryCaseStore {
    async fn create_case(&self, record: NewCaseRecord) -> Result<CaseRecord, CaseStoreError> {
        if let Some(message) = &self.failure {
            tracing::warn!(
                clinic_id = %record.clinic_id,
                "In-memory case store simulating write failure"
            );
            return Err(CaseStoreError::Unavailable(message.clone()));
        }

        let mut cases = self.cases.lock().await;

        if let Some(microchip) = &record.microchip {
            let collision = cases
                .iter()
                .any(|c| c.clinic_id == record.clinic_id && c.microchip.as_deref() == Some(microchip));
            if collision {
                return Err(CaseStoreError::Conflict(format!(
                    "microchip {} is already registered",
                    microchip
                )));
            }
        }

        let case = CaseRecord {
            id: uuid::Uuid::new_v4(),
            clinic_id: record.clinic_id,
            patient_name: record.patient_name,
            species: record.species,
            breed: record.breed,
            sex: record.sex,
            age_months: record.age_months,
            weight_kg: record.weight_kg,
            diagnosis_date: record.diagnosis_date,
            tumor_type: record.tumor_type,
            tumor_site: record.tumor_site,
            microchip: record.microchip,
            notes: record.notes,
            source_import_job_id: record.source_import_job_id,
            created_at: chrono::Utc::now(),
        };
        cases.push(case.clone());
        Ok(case)
    }

    async fn find_similar_case(
        &self,
        signature: &DuplicateSignature,
    ) -> Result<Option<CaseRecord>, CaseStoreError> {
        let cases = self.cases.lock().await;
        Ok(cases
            .iter()
            .find(|c| {
                c.clinic_id == signature.clinic_id
                    && c.diagnosis_date == signature.diagnosis_date
                    && c.species.trim().to_lowercase() == signature.species
                    && c.patient_name
                        .as_deref()
                        .map(|n| n.trim().to_lowercase() == signature.patient_name)
                        .unwrap_or(false)
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn record(clinic_id: Uuid, name: &str) -> NewCaseRecord {
        NewCaseRecord {
            clinic_id,
            patient_name: Some(name.to_string()),
            species: "canine".to_string(),
            breed: "beagle".to_string(),
            sex: None,
            age_months: Some(60),
            weight_kg: Some(12.0),
            diagnosis_date: NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
            tumor_type: None,
            tumor_site: None,
            microchip: None,
            notes: None,
            source_import_job_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_similar() {
        let store = InMemoryCaseStore::new();
        let clinic_id = Uuid::new_v4();

        let created = store.create_case(record(clinic_id, "Rex")).await.unwrap();
        assert_eq!(store.count().await, 1);

        let signature = DuplicateSignature::of(&record(clinic_id, "  REX ")).unwrap();
        let found = store.find_similar_case(&signature).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn test_find_similar_respects_clinic_boundary() {
        let store = InMemoryCaseStore::new();
        let clinic_id = Uuid::new_v4();
        store.create_case(record(clinic_id, "Rex")).await.unwrap();

        let other_clinic = DuplicateSignature::of(&record(Uuid::new_v4(), "Rex")).unwrap();
        assert!(store
            .find_similar_case(&other_clinic)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_find_similar_distinguishes_date() {
        let store = InMemoryCaseStore::new();
        let clinic_id = Uuid::new_v4();
        store.create_case(record(clinic_id, "Rex")).await.unwrap();

        let mut other_day = record(clinic_id, "Rex");
        other_day.diagnosis_date = NaiveDate::from_ymd_opt(2024, 5, 21).unwrap();
        let signature = DuplicateSignature::of(&other_day).unwrap();
        assert!(store.find_similar_case(&signature).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_microchip_conflict_within_clinic() {
        let store = InMemoryCaseStore::new();
        let clinic_id = Uuid::new_v4();

        let mut first = record(clinic_id, "Rex");
        first.microchip = Some("985112003456789".to_string());
        store.create_case(first).await.unwrap();

        let mut second = record(clinic_id, "Mia");
        second.microchip = Some("985112003456789".to_string());
        let err = store.create_case(second).await.unwrap_err();
        assert!(matches!(err, CaseStoreError::Conflict(_)));

        // The same chip in a different clinic is fine.
        let mut elsewhere = record(Uuid::new_v4(), "Mia");
        elsewhere.microchip = Some("985112003456789".to_string());
        assert!(store.create_case(elsewhere).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_store() {
        let store = InMemoryCaseStore::failing("connection refused");
        let err = store
            .create_case(record(Uuid::new_v4(), "Rex"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CaseStoreError::Unavailable("connection refused".to_string())
        );
        assert_eq!(store.count().await, 0);
    }
}
