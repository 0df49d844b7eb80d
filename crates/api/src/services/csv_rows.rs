//! CSV adapter for the import row source seam.
//!
//! Uploaded files are stored on disk at submit time and read back row by row
//! while the job runs. Parsing here must stay in lockstep with
//! [`count_data_rows`], which fixes the job's total at submit time.

use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};

use domain::services::{RawRow, RowSource, RowSourceError};

/// Count the data rows of an uploaded file, header excluded.
///
/// Uses the same reader configuration as [`CsvRowSource`] so the count always
/// matches what the runner will see.
pub fn count_data_rows(content: &str) -> Result<i64, RowSourceError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut record = StringRecord::new();
    let mut count = 0i64;
    loop {
        match reader.read_record(&mut record) {
            Ok(true) => count += 1,
            Ok(false) => break,
            Err(e) => {
                return Err(RowSourceError::Read {
                    row: count + 1,
                    message: e.to_string(),
                })
            }
        }
    }

    Ok(count)
}

/// Row source over a stored CSV upload.
///
/// The first record is treated as the header row; data rows are numbered
/// from 1. Short records are allowed, the missing cells simply stay unmapped.
pub struct CsvRowSource {
    reader: csv::Reader<File>,
    headers: Vec<String>,
    row: i64,
}

impl CsvRowSource {
    /// Open a stored upload and position the reader after the header row.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RowSourceError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path.as_ref())
            .map_err(|e| RowSourceError::Io(e.to_string()))?;

        let headers = reader
            .headers()
            .map_err(|e| RowSourceError::Io(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        Ok(Self {
            reader,
            headers,
            row: 0,
        })
    }
}

impl RowSource for CsvRowSource {
    fn next_row(&mut self) -> Result<Option<RawRow>, RowSourceError> {
        let mut record = StringRecord::new();
        let more = self
            .reader
            .read_record(&mut record)
            .map_err(|e| RowSourceError::Read {
                row: self.row + 1,
                message: e.to_string(),
            })?;

        if !more {
            return Ok(None);
        }

        self.row += 1;
        let values = self
            .headers
            .iter()
            .enumerate()
            .filter_map(|(idx, header)| {
                record.get(idx).map(|cell| (header.clone(), cell.to_string()))
            })
            .collect();

        Ok(Some(RawRow {
            row: self.row,
            values,
        }))
    }

    fn skip_rows(&mut self, count: i64) -> Result<(), RowSourceError> {
        let mut record = StringRecord::new();
        for _ in 0..count.max(0) {
            let more = self
                .reader
                .read_record(&mut record)
                .map_err(|e| RowSourceError::Read {
                    row: self.row + 1,
                    message: e.to_string(),
                })?;

            if !more {
                break;
            }
            self.row += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    const SAMPLE: &str = "Pet Name,Kind,Breed,Diagnosed\n\
        Rex,canine,Labrador,2024-03-14\n\
        Mia,feline,Siamese,2023-11-02\n\
        Bo,canine,Boxer,2024-01-20\n";

    fn write_temp_csv(content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("csv_rows_test_{}.csv", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_count_data_rows() {
        assert_eq!(count_data_rows(SAMPLE).unwrap(), 3);
    }

    #[test]
    fn test_count_header_only() {
        assert_eq!(count_data_rows("Pet Name,Kind\n").unwrap(), 0);
    }

    #[test]
    fn test_count_empty_content() {
        assert_eq!(count_data_rows("").unwrap(), 0);
    }

    #[test]
    fn test_count_handles_ragged_rows() {
        let content = "A,B,C\n1,2,3\n1,2\n1,2,3,4\n";
        assert_eq!(count_data_rows(content).unwrap(), 3);
    }

    #[test]
    fn test_csv_source_yields_rows_by_header() {
        let path = write_temp_csv(SAMPLE);
        let mut source = CsvRowSource::open(&path).unwrap();

        let first = source.next_row().unwrap().unwrap();
        assert_eq!(first.row, 1);
        assert_eq!(first.values["Pet Name"], "Rex");
        assert_eq!(first.values["Diagnosed"], "2024-03-14");

        let second = source.next_row().unwrap().unwrap();
        assert_eq!(second.row, 2);
        assert_eq!(second.values["Kind"], "feline");

        let third = source.next_row().unwrap().unwrap();
        assert_eq!(third.row, 3);
        assert!(source.next_row().unwrap().is_none());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_csv_source_short_record_leaves_cells_unmapped() {
        let path = write_temp_csv("Pet Name,Kind,Breed\nRex,canine\n");
        let mut source = CsvRowSource::open(&path).unwrap();

        let row = source.next_row().unwrap().unwrap();
        assert_eq!(row.values.len(), 2);
        assert_eq!(row.values["Kind"], "canine");
        assert!(!row.values.contains_key("Breed"));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_csv_source_skip_rows_keeps_numbering() {
        let path = write_temp_csv(SAMPLE);
        let mut source = CsvRowSource::open(&path).unwrap();

        source.skip_rows(2).unwrap();
        let row = source.next_row().unwrap().unwrap();
        assert_eq!(row.row, 3);
        assert_eq!(row.values["Pet Name"], "Bo");

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_csv_source_open_missing_file() {
        let path = std::env::temp_dir().join("csv_rows_test_does_not_exist.csv");
        let err = CsvRowSource::open(&path).unwrap_err();
        assert!(matches!(err, RowSourceError::Io(_)));
    }

    #[test]
    fn test_csv_source_trims_header_whitespace() {
        let path = write_temp_csv(" Pet Name , Kind \nRex,canine\n");
        let mut source = CsvRowSource::open(&path).unwrap();

        let row = source.next_row().unwrap().unwrap();
        assert_eq!(row.values["Pet Name"], "Rex");
        assert_eq!(row.values["Kind"], "canine");

        let _ = std::fs::remove_file(path);
    }
}
