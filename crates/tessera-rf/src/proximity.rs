//! Pairwise row proximity from shared leaves.

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::instrument;

use crate::data_frame::DataFrame;
use crate::error::RfError;
use crate::forest::RandomForest;

/// Symmetric `n × n` matrix of the fraction of trees in which two rows share a leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityMatrix {
    values: Vec<f64>,
    n_rows: usize,
}

impl ProximityMatrix {
    /// Return the proximity of rows `i` and `j`.
    ///
    /// # Panics
    ///
    /// Panics if `i` or `j` is out of range.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.n_rows && j < self.n_rows, "row index out of range");
        self.values[i * self.n_rows + j]
    }

    /// Return the number of rows (and columns).
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Return the row-major values.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

impl RandomForest {
    /// Compute the proximity of every pair of rows in `data`.
    ///
    /// Each row is routed through every tree; two rows sharing a leaf in a
    /// tree gain one count, and counts are divided by the number of trees.
    /// The diagonal is 1.0.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::NotTrained`] | the forest has no trees |
    /// | [`RfError::FactorLabelMismatch`] | `data` has different factors |
    #[instrument(skip_all, fields(n_trees = self.trees.len(), n_rows = data.n_rows()))]
    pub fn find_proximity(&self, data: &DataFrame) -> Result<ProximityMatrix, RfError> {
        self.require_trained()?;
        self.check_factors(data)?;
        let n = data.n_rows();

        let counts = self
            .trees
            .par_iter()
            .fold(
                || vec![0u32; n * n],
                |mut acc, tree| {
                    let mut by_leaf: Vec<(usize, usize)> = (0..n)
                        .map(|r| (tree.traverse(data.row(r)), r))
                        .collect();
                    by_leaf.sort_unstable();
                    for group in by_leaf.chunk_by(|a, b| a.0 == b.0) {
                        for (k, &(_, i)) in group.iter().enumerate() {
                            for &(_, j) in &group[k + 1..] {
                                acc[i * n + j] += 1;
                            }
                        }
                    }
                    acc
                },
            )
            .reduce(
                || vec![0u32; n * n],
                |mut a, b| {
                    a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
                    a
                },
            );

        let n_trees = self.trees.len() as f64;
        let mut values = vec![0.0f64; n * n];
        for i in 0..n {
            values[i * n + i] = 1.0;
            for j in i + 1..n {
                let p = f64::from(counts[i * n + j]) / n_trees;
                values[i * n + j] = p;
                values[j * n + i] = p;
            }
        }

        Ok(ProximityMatrix { values, n_rows: n })
    }
}
