//! Import engine services.

pub mod csv_rows;
pub mod import_runner;

#[allow(unused_imports)] // Used in routes
pub use csv_rows::{count_data_rows, CsvRowSource};
pub use import_runner::{CancelRegistry, ImportRunError, ImportRunnerConfig, ImportRunnerService};
