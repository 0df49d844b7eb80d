//! Row source abstraction for import files.
//!
//! A row source yields the data rows of one uploaded file in order, keyed by
//! the file's own column headers. Sources are restartable: a worker resuming
//! an interrupted job skips the rows that were already processed and carries
//! on from there.

use std::collections::HashMap;

/// One raw data row from an import file.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    /// Data row number (1-indexed, header excluded).
    pub row: i64,

    /// Cell values by file header.
    pub values: HashMap<String, String>,
}

/// Errors returned while reading rows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowSourceError {
    /// A row could not be read or parsed.
    #[error("failed to read row {row}: {message}")]
    Read { row: i64, message: String },

    /// The underlying file could not be opened or read.
    #[error("failed to read import file: {0}")]
    Io(String),
}

/// Sequential reader over the data rows of an import file.
pub trait RowSource: Send {
    /// The next data row, or None when the file is exhausted.
    fn next_row(&mut self) -> Result<Option<RawRow>, RowSourceError>;

    /// Skip the next `count` data rows. Used to resume an interrupted job.
    fn skip_rows(&mut self, count: i64) -> Result<(), RowSourceError>;
}

/// Row source over a fixed list of rows, for development and testing.
#[derive(Debug, Default)]
pub struct VecRowSource {
    rows: Vec<RawRow>,
    cursor: usize,
    /// When set, reading this row number fails.
    fail_at: Option<i64>,
}

impl VecRowSource {
    /// Build a source from (header, value) cell lists, one list per row.
    /// Rows are numbered from 1 in the given order.
    pub fn new(rows: Vec<Vec<(&str, &str)>>) -> Self {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, cells)| RawRow {
                row: (idx + 1) as i64,
                values: cells
                    .into_iter()
                    .map(|(h, v)| (h.to_string(), v.to_string()))
                    .collect(),
            })
            .collect();
        Self {
            rows,
            cursor: 0,
            fail_at: None,
        }
    }

    /// Make reading the given row number fail.
    pub fn failing_at(mut self, row: i64) -> Self {
        self.fail_at = Some(row);
        self
    }
}

impl RowSource for VecRowSource {
    fn next_row(&mut self) -> Result<Option<RawRow>, RowSourceError> {
        match self.rows.get(self.cursor) {
            Some(row) => {
                if self.fail_at == Some(row.row) {
                    return Err(RowSourceError::Read {
                        row: row.row,
                        message: "simulated read failure".to_string(),
                    });
                }
                self.cursor += 1;
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }

    fn skip_rows(&mut self, count: i64) -> Result<(), RowSourceError> {
        self.cursor = self.cursor.saturating_add(count.max(0) as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_source_yields_rows_in_order() {
        let mut source = VecRowSource::new(vec![
            vec![("Name", "Rex"), ("Kind", "canine")],
            vec![("Name", "Mia"), ("Kind", "feline")],
        ]);

        let first = source.next_row().unwrap().unwrap();
        assert_eq!(first.row, 1);
        assert_eq!(first.values["Name"], "Rex");

        let second = source.next_row().unwrap().unwrap();
        assert_eq!(second.row, 2);
        assert_eq!(second.values["Kind"], "feline");

        assert!(source.next_row().unwrap().is_none());
        assert!(source.next_row().unwrap().is_none());
    }

    #[test]
    fn test_vec_source_skip_rows() {
        let mut source = VecRowSource::new(vec![
            vec![("Name", "Rex")],
            vec![("Name", "Mia")],
            vec![("Name", "Bo")],
        ]);

        source.skip_rows(2).unwrap();
        let next = source.next_row().unwrap().unwrap();
        assert_eq!(next.row, 3);
        assert_eq!(next.values["Name"], "Bo");
    }

    #[test]
    fn test_vec_source_skip_past_end() {
        let mut source = VecRowSource::new(vec![vec![("Name", "Rex")]]);
        source.skip_rows(10).unwrap();
        assert!(source.next_row().unwrap().is_none());
    }

    #[test]
    fn test_vec_source_failing_at() {
        let mut source =
            VecRowSource::new(vec![vec![("Name", "Rex")], vec![("Name", "Mia")]]).failing_at(2);

        assert!(source.next_row().is_ok());
        let err = source.next_row().unwrap_err();
        assert_eq!(
            err,
            RowSourceError::Read {
                row: 2,
                message: "simulated read failure".to_string(),
            }
        );
    }
}
