//! Tabular training data: rows of factor values with a class label each.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;

use crate::error::RfError;

/// A labeled dataset of numeric factor vectors.
///
/// Values are stored row-major: `rows[row][factor]`. A missing value is
/// represented as `NaN`; infinities are rejected on insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    factor_labels: Vec<String>,
    rows: Vec<Vec<f64>>,
    class_labels: Vec<String>,
}

impl DataFrame {
    /// Create an empty dataset with the given factor (column) names.
    #[must_use]
    pub fn new(factor_labels: Vec<String>) -> Self {
        Self {
            factor_labels,
            rows: Vec::new(),
            class_labels: Vec::new(),
        }
    }

    /// Build a dataset from parallel row and label vectors.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::FeatureCountMismatch`] | bad row length, or `rows` and `labels` differ |
    /// | [`RfError::NonFiniteValue`] | a value is infinite |
    pub fn from_rows(
        factor_labels: Vec<String>,
        rows: Vec<Vec<f64>>,
        labels: Vec<String>,
    ) -> Result<Self, RfError> {
        if rows.len() != labels.len() {
            return Err(RfError::FeatureCountMismatch {
                expected: rows.len(),
                got: labels.len(),
                row: rows.len().min(labels.len()),
            });
        }
        let mut frame = Self::new(factor_labels);
        for (values, label) in rows.into_iter().zip(labels) {
            frame.push_row(values, label)?;
        }
        Ok(frame)
    }

    /// Append one labeled row.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::FeatureCountMismatch`] | `values.len()` differs from the factor count |
    /// | [`RfError::NonFiniteValue`] | a value is infinite (`NaN` marks a missing value) |
    pub fn push_row(
        &mut self,
        values: Vec<f64>,
        class_label: impl Into<String>,
    ) -> Result<(), RfError> {
        let row = self.rows.len();
        if values.len() != self.factor_labels.len() {
            return Err(RfError::FeatureCountMismatch {
                expected: self.factor_labels.len(),
                got: values.len(),
                row,
            });
        }
        if let Some(factor) = values.iter().position(|v| v.is_infinite()) {
            return Err(RfError::NonFiniteValue { row, factor });
        }
        self.rows.push(values);
        self.class_labels.push(class_label.into());
        Ok(())
    }

    // --- Shape and access ---

    /// Return the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Return the number of factors per row.
    #[must_use]
    pub fn n_factors(&self) -> usize {
        self.factor_labels.len()
    }

    /// Return `true` when the dataset has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Return the factor names in column order.
    #[must_use]
    pub fn factor_labels(&self) -> &[String] {
        &self.factor_labels
    }

    /// Return all rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Return the factor values of one row.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of range.
    #[must_use]
    pub fn row(&self, row: usize) -> &[f64] {
        &self.rows[row]
    }

    /// Return the value at `(row, factor)`.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `factor` is out of range.
    #[must_use]
    pub fn value(&self, row: usize, factor: usize) -> f64 {
        self.rows[row][factor]
    }

    /// Overwrite the value at `(row, factor)`.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `factor` is out of range.
    pub fn set_value(&mut self, row: usize, factor: usize, value: f64) {
        self.rows[row][factor] = value;
    }

    /// Return the class label of a row.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of range.
    #[must_use]
    pub fn class_label(&self, row: usize) -> &str {
        &self.class_labels[row]
    }

    /// Return the class labels of all rows.
    #[must_use]
    pub fn class_labels(&self) -> &[String] {
        &self.class_labels
    }

    /// Overwrite the class label of a row.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of range.
    pub fn set_class_label(&mut self, row: usize, class_label: impl Into<String>) {
        self.class_labels[row] = class_label.into();
    }

    // --- Missing values ---

    /// Return `true` if the value at `(row, factor)` is missing.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `factor` is out of range.
    #[must_use]
    pub fn is_missing(&self, row: usize, factor: usize) -> bool {
        self.rows[row][factor].is_nan()
    }

    /// Return every `(row, factor)` position holding a missing value, in row-major order.
    #[must_use]
    pub fn missing_positions(&self) -> Vec<(usize, usize)> {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(r, values)| {
                values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.is_nan())
                    .map(move |(f, _)| (r, f))
            })
            .collect()
    }

    /// Return the first missing position, if any.
    #[must_use]
    pub fn first_missing(&self) -> Option<(usize, usize)> {
        self.rows.iter().enumerate().find_map(|(r, values)| {
            values.iter().position(|v| v.is_nan()).map(|f| (r, f))
        })
    }

    // --- Classes ---

    /// Return the distinct class labels in sorted order.
    #[must_use]
    pub fn distinct_classes(&self) -> Vec<String> {
        self.class_labels
            .iter()
            .map(String::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Return `true` if at least one row carries `class_label`.
    #[must_use]
    pub fn contains_class(&self, class_label: &str) -> bool {
        self.class_labels.iter().any(|c| c == class_label)
    }

    /// Group row indices by class label.
    #[must_use]
    pub fn class_groups(&self) -> BTreeMap<&str, Vec<usize>> {
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (row, label) in self.class_labels.iter().enumerate() {
            groups.entry(label.as_str()).or_default().push(row);
        }
        groups
    }

    /// Map every row's label to its position in `class_order`.
    pub(crate) fn encode_classes(&self, class_order: &[String]) -> Result<Vec<usize>, RfError> {
        let lookup: BTreeMap<&str, usize> = class_order
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        self.class_labels
            .iter()
            .map(|label| {
                lookup
                    .get(label.as_str())
                    .copied()
                    .ok_or_else(|| RfError::UnknownClass {
                        class: label.clone(),
                    })
            })
            .collect()
    }

    // --- Sampling ---

    /// Draw `draw_count` row indices uniformly with replacement.
    ///
    /// Returns an empty sample for an empty dataset.
    pub fn sample_with_replacement(&self, draw_count: usize, rng: &mut impl Rng) -> Vec<usize> {
        if self.rows.is_empty() {
            return Vec::new();
        }
        (0..draw_count)
            .map(|_| rng.gen_range(0..self.rows.len()))
            .collect()
    }

    /// Draw a class-balanced bootstrap sample.
    ///
    /// Every class contributes `ceil(n_rows / n_classes)` draws with
    /// replacement from its own rows, so minority classes are oversampled and
    /// majority classes undersampled.
    pub fn sample_balanced(&self, rng: &mut impl Rng) -> Vec<usize> {
        let groups = self.class_groups();
        if groups.is_empty() {
            return Vec::new();
        }
        let per_class = self.rows.len().div_ceil(groups.len());
        let mut sample = Vec::with_capacity(per_class * groups.len());
        for rows in groups.values() {
            for _ in 0..per_class {
                sample.push(rows[rng.gen_range(0..rows.len())]);
            }
        }
        sample
    }

    // --- Derived frames ---

    /// Copy the rows whose label satisfies `keep`, preserving order.
    pub(crate) fn filter_classes(&self, keep: impl Fn(&str) -> bool) -> DataFrame {
        let mut out = DataFrame::new(self.factor_labels.clone());
        for (values, label) in self.rows.iter().zip(&self.class_labels) {
            if keep(label) {
                out.rows.push(values.clone());
                out.class_labels.push(label.clone());
            }
        }
        out
    }

    /// Copy the frame, replacing each label by `relabel(label)`.
    pub(crate) fn map_classes(&self, relabel: impl Fn(&str) -> String) -> DataFrame {
        DataFrame {
            factor_labels: self.factor_labels.clone(),
            rows: self.rows.clone(),
            class_labels: self.class_labels.iter().map(|c| relabel(c.as_str())).collect(),
        }
    }
}
