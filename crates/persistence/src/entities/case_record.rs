//! Case record entity.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database entity for oncology case records.
#[derive(Debug, Clone, FromRow)]
pub struct CaseRecordEntity {
    /// Unique database identifier.
    pub id: Uuid,

    /// Clinic that owns the record.
    pub clinic_id: Uuid,

    /// Patient name, when known.
    pub patient_name: Option<String>,

    /// Species of the patient.
    pub species: String,

    /// Breed of the patient.
    pub breed: String,

    /// Sex of the patient.
    pub sex: Option<String>,

    /// Age at diagnosis in months.
    pub age_months: Option<i32>,

    /// Weight at diagnosis in kilograms.
    pub weight_kg: Option<f64>,

    /// Date of diagnosis.
    pub diagnosis_date: NaiveDate,

    /// Tumor type.
    pub tumor_type: Option<String>,

    /// Anatomical tumor site.
    pub tumor_site: Option<String>,

    /// Microchip transponder code, unique within a clinic.
    pub microchip: Option<String>,

    /// Free-form clinical notes.
    pub notes: Option<String>,

    /// Import job that created this record, for records from bulk imports.
    pub source_import_job_id: Option<Uuid>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_record_entity_creation() {
        let entity = CaseRecordEntity {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            patient_name: Some("Rex".to_string()),
            species: "canine".to_string(),
            breed: "Labrador Retriever".to_string(),
            sex: Some("male".to_string()),
            age_months: Some(84),
            weight_kg: Some(32.5),
            diagnosis_date: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            tumor_type: Some("mast cell tumor".to_string()),
            tumor_site: Some("left foreleg".to_string()),
            microchip: Some("985112003456789".to_string()),
            notes: None,
            source_import_job_id: Some(Uuid::new_v4()),
            created_at: Utc::now(),
        };

        assert_eq!(entity.species, "canine");
        assert_eq!(entity.age_months, Some(84));
    }
}
