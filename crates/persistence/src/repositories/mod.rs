//! Repository implementations for database operations.

pub mod case_record;
pub mod import_job;

pub use case_record::CaseRecordRepository;
pub use import_job::ImportJobRepository;
