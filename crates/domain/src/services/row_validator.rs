//! Row projection and validation for bulk case imports.
//!
//! Each raw file row is projected through the resolved column mapping into a
//! draft, then the draft is validated as a whole. Every problem in a row is
//! collected before the row is rejected, so one upload round-trip surfaces
//! one complete error per row instead of a trickle.

use chrono::NaiveDate;
use uuid::Uuid;
use validator::ValidationError;

use crate::models::case_record::{CaseRecordDraft, NewCaseRecord};
use crate::models::field_mapping::{CanonicalField, ResolvedMapping};
use crate::services::row_source::RawRow;
use shared::validation::{
    validate_age_months, validate_breed, validate_diagnosis_date, validate_microchip,
    validate_patient_name, validate_species, validate_weight_kg,
};

/// Maximum length of the sex field.
const MAX_SEX_LEN: usize = 50;

/// Maximum length of tumor type and tumor site fields.
const MAX_TUMOR_FIELD_LEN: usize = 200;

/// A row rejected by validation, with every problem found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowValidationError {
    /// Data row number (1-indexed, header excluded).
    pub row: i64,

    /// Every validation problem found in the row.
    pub problems: Vec<String>,
}

impl RowValidationError {
    /// All problems folded into one message, for the error report.
    pub fn message(&self) -> String {
        self.problems.join("; ")
    }
}

impl std::fmt::Display for RowValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}: {}", self.row, self.message())
    }
}

impl std::error::Error for RowValidationError {}

/// Project a raw row through the resolved mapping.
///
/// Values are trimmed and blank cells dropped. Columns the mapping does not
/// cover are ignored.
pub fn project_row(raw: &RawRow, mapping: &ResolvedMapping) -> CaseRecordDraft {
    let mut draft = CaseRecordDraft::new(raw.row);
    for (header, value) in &raw.values {
        if let Some(field) = mapping.field_for(header) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                draft.fields.insert(field, trimmed.to_string());
            }
        }
    }
    draft
}

/// Validate a draft and build the case record input from it.
///
/// Returns every problem found in the row at once. A draft with no values at
/// all (a blank row) fails with one problem per missing required field.
pub fn validate_draft(
    draft: &CaseRecordDraft,
    clinic_id: Uuid,
    import_job_id: Uuid,
) -> Result<NewCaseRecord, RowValidationError> {
    let mut problems = Vec::new();

    let patient_name = draft.get(CanonicalField::PatientName).map(|name| {
        if let Err(err) = validate_patient_name(name) {
            problems.push(describe(err));
        }
        name.to_string()
    });

    let species = match draft.get(CanonicalField::Species) {
        Some(value) => {
            if let Err(err) = validate_species(value) {
                problems.push(describe(err));
            }
            value.to_string()
        }
        None => {
            problems.push("species is required".to_string());
            String::new()
        }
    };

    let breed = match draft.get(CanonicalField::Breed) {
        Some(value) => {
            if let Err(err) = validate_breed(value) {
                problems.push(describe(err));
            }
            value.to_string()
        }
        None => {
            problems.push("breed is required".to_string());
            String::new()
        }
    };

    let diagnosis_date = match draft.get(CanonicalField::DiagnosisDate) {
        Some(raw) => match parse_flexible_date(raw) {
            Some(date) => {
                if let Err(err) = validate_diagnosis_date(&date) {
                    problems.push(describe(err));
                }
                Some(date)
            }
            None => {
                problems.push(format!("invalid diagnosis date '{}'", raw));
                None
            }
        },
        None => {
            problems.push("diagnosis date is required".to_string());
            None
        }
    };

    let age_months = draft
        .get(CanonicalField::AgeMonths)
        .and_then(|raw| match raw.parse::<i32>() {
            Ok(age) => {
                if let Err(err) = validate_age_months(age) {
                    problems.push(describe(err));
                }
                Some(age)
            }
            Err(_) => {
                problems.push(format!("invalid age '{}'", raw));
                None
            }
        });

    let weight_kg = draft
        .get(CanonicalField::WeightKg)
        .and_then(|raw| match raw.parse::<f64>() {
            Ok(weight) => {
                if let Err(err) = validate_weight_kg(weight) {
                    problems.push(describe(err));
                }
                Some(weight)
            }
            Err(_) => {
                problems.push(format!("invalid weight '{}'", raw));
                None
            }
        });

    let sex = draft.get(CanonicalField::Sex).map(|value| {
        if value.len() > MAX_SEX_LEN {
            problems.push("sex must be at most 50 characters".to_string());
        }
        value.to_string()
    });

    let tumor_type = draft.get(CanonicalField::TumorType).map(|value| {
        if value.len() > MAX_TUMOR_FIELD_LEN {
            problems.push("tumor type must be at most 200 characters".to_string());
        }
        value.to_string()
    });

    let tumor_site = draft.get(CanonicalField::TumorSite).map(|value| {
        if value.len() > MAX_TUMOR_FIELD_LEN {
            problems.push("tumor site must be at most 200 characters".to_string());
        }
        value.to_string()
    });

    let microchip = draft.get(CanonicalField::Microchip).map(|value| {
        if let Err(err) = validate_microchip(value) {
            problems.push(describe(err));
        }
        value.to_string()
    });

    let notes = draft.get(CanonicalField::Notes).map(|v| v.to_string());

    if !problems.is_empty() {
        return Err(RowValidationError {
            row: draft.row,
            problems,
        });
    }

    // All problems were checked above, so the required values are present.
    let diagnosis_date = diagnosis_date.ok_or_else(|| RowValidationError {
        row: draft.row,
        problems: vec!["diagnosis date is required".to_string()],
    })?;

    Ok(NewCaseRecord {
        clinic_id,
        patient_name,
        species,
        breed,
        sex,
        age_months,
        weight_kg,
        diagnosis_date,
        tumor_type,
        tumor_site,
        microchip,
        notes,
        source_import_job_id: Some(import_job_id),
    })
}

/// Parse a date cell. Accepts ISO (2024-03-14) and day-first (14.03.2024)
/// forms, the two formats clinic exports actually use.
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(raw, "%d.%m.%Y").ok())
}

fn describe(err: ValidationError) -> String {
    err.message
        .map(|m| m.to_string())
        .unwrap_or_else(|| err.code.to_string())
}
