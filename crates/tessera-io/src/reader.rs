//! CSV dataset reader producing a [`DataFrame`].

use std::path::{Path, PathBuf};

use tessera_rf::DataFrame;
use tracing::{debug, info, instrument};

use crate::IoError;

/// Cell values read as a missing value.
const MISSING_MARKERS: [&str; 3] = ["", "?", "NaN"];

/// Reads a labeled dataset from a CSV file.
///
/// Expected CSV format:
/// - Header row required (first column is the class label, remaining are factor names)
/// - `class,factor1,factor2,...,factorN`
/// - One row per observation, all rows must have the same number of columns
/// - Empty, `?` and `NaN` cells (case-insensitive) are missing values
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::NoFactorColumns`] | Only the class column, no factor columns |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::EmptyClassLabel`] | A row's class cell is blank |
/// | [`IoError::InvalidValue`] | Cell is infinite or not a number |
pub struct FrameReader {
    path: PathBuf,
}

fn is_missing(raw: &str) -> bool {
    MISSING_MARKERS.iter().any(|m| m.eq_ignore_ascii_case(raw))
}

impl FrameReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read and validate the CSV file.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<DataFrame, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) lets the row-length check below report the offending row.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        })?;
        let expected_cols = header.len();
        debug!(expected_cols, "read CSV header");

        if expected_cols < 2 {
            return Err(IoError::NoFactorColumns {
                path: self.path.clone(),
            });
        }

        let factor_labels: Vec<String> = header.iter().skip(1).map(String::from).collect();
        let mut frame = DataFrame::new(factor_labels);
        let mut n_missing = 0usize;

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| IoError::CsvParse {
                path: self.path.clone(),
                offset: e.position().map_or(0, |p| p.byte()),
                source: e,
            })?;

            if record.len() != expected_cols {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: expected_cols,
                    got: record.len(),
                });
            }

            let class_label = record.get(0).unwrap_or("");
            if class_label.is_empty() {
                return Err(IoError::EmptyClassLabel {
                    path: self.path.clone(),
                    row_index,
                });
            }

            let mut values = Vec::with_capacity(expected_cols - 1);
            for (col_index, raw) in record.iter().skip(1).enumerate() {
                if is_missing(raw) {
                    values.push(f64::NAN);
                    n_missing += 1;
                    continue;
                }
                let value = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| IoError::InvalidValue {
                        path: self.path.clone(),
                        row_index,
                        col_index,
                        raw: raw.to_string(),
                    })?;
                values.push(value);
            }

            frame.push_row(values, class_label)?;
        }

        if frame.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        info!(
            n_rows = frame.n_rows(),
            n_factors = frame.n_factors(),
            n_missing,
            "dataset loaded"
        );

        Ok(frame)
    }
}
