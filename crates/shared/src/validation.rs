//! Common validation utilities for case record fields.

use chrono::{NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

/// Maximum length of a patient name.
pub const MAX_PATIENT_NAME_LEN: usize = 200;

/// Maximum length of a species or breed value.
pub const MAX_SPECIES_LEN: usize = 100;

/// Maximum age of a patient in months (50 years).
pub const MAX_AGE_MONTHS: i32 = 600;

/// Maximum patient weight in kilograms.
pub const MAX_WEIGHT_KG: f64 = 2500.0;

lazy_static! {
    /// ISO 11784/11785 transponder codes are numeric, 9 to 15 digits.
    static ref MICROCHIP_RE: Regex = Regex::new(r"^[0-9]{9,15}$").expect("valid regex");
}

/// Validates that a patient name fits the storage limit.
pub fn validate_patient_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("patient_name_empty");
        err.message = Some("Patient name must not be blank".into());
        return Err(err);
    }
    if name.len() > MAX_PATIENT_NAME_LEN {
        let mut err = ValidationError::new("patient_name_length");
        err.message = Some("Patient name must be at most 200 characters".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a species value (required, bounded length).
pub fn validate_species(species: &str) -> Result<(), ValidationError> {
    if species.trim().is_empty() {
        let mut err = ValidationError::new("species_required");
        err.message = Some("Species is required".into());
        return Err(err);
    }
    if species.len() > MAX_SPECIES_LEN {
        let mut err = ValidationError::new("species_length");
        err.message = Some("Species must be at most 100 characters".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a breed value (required, bounded length).
pub fn validate_breed(breed: &str) -> Result<(), ValidationError> {
    if breed.trim().is_empty() {
        let mut err = ValidationError::new("breed_required");
        err.message = Some("Breed is required".into());
        return Err(err);
    }
    if breed.len() > MAX_SPECIES_LEN {
        let mut err = ValidationError::new("breed_length");
        err.message = Some("Breed must be at most 100 characters".into());
        return Err(err);
    }
    Ok(())
}

/// Validates that a patient age is within valid range (0 to 600 months).
pub fn validate_age_months(age: i32) -> Result<(), ValidationError> {
    if (0..=MAX_AGE_MONTHS).contains(&age) {
        Ok(())
    } else {
        let mut err = ValidationError::new("age_months_range");
        err.message = Some("Age must be between 0 and 600 months".into());
        Err(err)
    }
}

/// Validates that a patient weight is positive and within valid range.
pub fn validate_weight_kg(weight: f64) -> Result<(), ValidationError> {
    if weight > 0.0 && weight <= MAX_WEIGHT_KG {
        Ok(())
    } else {
        let mut err = ValidationError::new("weight_range");
        err.message = Some("Weight must be between 0 and 2500 kg".into());
        Err(err)
    }
}

/// Validates a microchip transponder code (9 to 15 digits).
pub fn validate_microchip(microchip: &str) -> Result<(), ValidationError> {
    if MICROCHIP_RE.is_match(microchip) {
        Ok(())
    } else {
        let mut err = ValidationError::new("microchip_format");
        err.message = Some("Microchip must be 9 to 15 digits".into());
        Err(err)
    }
}

/// Validates that a diagnosis date is not in the future.
pub fn validate_diagnosis_date(date: &NaiveDate) -> Result<(), ValidationError> {
    let today = Utc::now().date_naive();
    if *date <= today {
        Ok(())
    } else {
        let mut err = ValidationError::new("diagnosis_date_future");
        err.message = Some("Diagnosis date cannot be in the future".into());
        Err(err)
    }
}
