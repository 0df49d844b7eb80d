//! Domain models for Onco Registry.

pub mod case_record;
pub mod field_mapping;
pub mod import_job;

pub use case_record::{CaseRecord, CaseRecordDraft, DuplicateSignature, NewCaseRecord};
pub use field_mapping::{
    resolve_mapping, CanonicalField, FieldMapping, MappingError, MappingProblem, ResolvedMapping,
    REQUIRED_FIELDS,
};
pub use import_job::{
    ImportJob, ImportJobResponse, ImportJobStatus, ImportPagination, JobOutcome, ListImportsQuery,
    ListImportsResponse, NewImportJob, ProgressWrite, RowError, RowProgress, RowTally,
    SubmitImportRequest,
};
