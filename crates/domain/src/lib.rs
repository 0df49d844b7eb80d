//! Domain layer for Onco Registry backend.
//!
//! This crate contains:
//! - Domain models (ImportJob, CaseRecord, FieldMapping)
//! - Business logic services and collaborator seams
//! - Domain error types

pub mod models;
pub mod services;
