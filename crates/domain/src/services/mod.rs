//! Domain services for Onco Registry.
//!
//! Services contain business logic that operates on domain models.

pub mod case_store;
pub mod ledger;
pub mod row_source;
pub mod row_validator;

pub use case_store::{CaseStore, CaseStoreError, InMemoryCaseStore};

pub use ledger::{ImportLedger, InMemoryImportLedger, LedgerError};

pub use row_source::{RawRow, RowSource, RowSourceError, VecRowSource};

pub use row_validator::{parse_flexible_date, project_row, validate_draft, RowValidationError};
