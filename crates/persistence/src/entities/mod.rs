//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod case_record;
pub mod import_job;

pub use case_record::CaseRecordEntity;
pub use import_job::ImportJobEntity;
