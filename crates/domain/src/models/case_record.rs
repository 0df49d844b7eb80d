//! Oncology case record models.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::field_mapping::CanonicalField;

/// A persisted oncology case record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    /// Internal identifier.
    pub id: Uuid,

    /// Clinic that owns the record.
    pub clinic_id: Uuid,

    /// Patient name, when known.
    pub patient_name: Option<String>,

    /// Species of the patient.
    pub species: String,

    /// Breed of the patient.
    pub breed: String,

    /// Sex of the patient, when known.
    pub sex: Option<String>,

    /// Age at diagnosis in months, when known.
    pub age_months: Option<i32>,

    /// Weight at diagnosis in kilograms, when known.
    pub weight_kg: Option<f64>,

    /// Date of diagnosis.
    pub diagnosis_date: NaiveDate,

    /// Tumor type, when known.
    pub tumor_type: Option<String>,

    /// Anatomical tumor site, when known.
    pub tumor_site: Option<String>,

    /// Microchip transponder code, when known. Unique within a clinic.
    pub microchip: Option<String>,

    /// Free-form clinical notes.
    pub notes: Option<String>,

    /// Import job that created this record, when it came from a bulk import.
    pub source_import_job_id: Option<Uuid>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

/// Input for creating a case record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCaseRecord {
    pub clinic_id: Uuid,
    pub patient_name: Option<String>,
    pub species: String,
    pub breed: String,
    pub sex: Option<String>,
    pub age_months: Option<i32>,
    pub weight_kg: Option<f64>,
    pub diagnosis_date: NaiveDate,
    pub tumor_type: Option<String>,
    pub tumor_site: Option<String>,
    pub microchip: Option<String>,
    pub notes: Option<String>,
    pub source_import_job_id: Option<Uuid>,
}

/// Raw field values projected from one file row, before validation.
///
/// Values are trimmed and blank cells are dropped during projection, so a
/// missing key means the cell was absent or empty.
#[derive(Debug, Clone, Default)]
pub struct CaseRecordDraft {
    /// Data row number (1-indexed, header excluded).
    pub row: i64,

    /// Projected values by canonical field.
    pub fields: HashMap<CanonicalField, String>,
}

impl CaseRecordDraft {
    pub fn new(row: i64) -> Self {
        Self {
            row,
            fields: HashMap::new(),
        }
    }

    /// Projected value for a field, if the cell was present and non-blank.
    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        self.fields.get(&field).map(|s| s.as_str())
    }
}

/// Normalized identity used to look for an already registered case.
///
/// Built only when the row carries a patient name. Name and species are
/// trimmed and lowercased so formatting differences between files do not hide
/// a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DuplicateSignature {
    pub clinic_id: Uuid,
    pub patient_name: String,
    pub species: String,
    pub diagnosis_date: NaiveDate,
}

impl DuplicateSignature {
    /// Build the signature for a record, or None when the record has no
    /// patient name to match on.
    pub fn of(record: &NewCaseRecord) -> Option<Self> {
        let patient_name = record.patient_name.as_deref()?;
        Some(Self {
            clinic_id: record.clinic_id,
            patient_name: normalize(patient_name),
            species: normalize(&record.species),
            diagnosis_date: record.diagnosis_date,
        })
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}
