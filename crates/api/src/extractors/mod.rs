//! Custom Axum extractors.
//!
//! Extractors for parsing and validating request data.

pub mod clinic_context;

#[allow(unused_imports)] // Re-exports for downstream use
pub use clinic_context::{ClinicContext, CLINIC_ID_HEADER, USER_ID_HEADER};
