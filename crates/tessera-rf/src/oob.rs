//! Out-of-bag (OOB) generalization error.

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, instrument};

use crate::data_frame::DataFrame;
use crate::error::RfError;
use crate::forest::RandomForest;
use crate::tree::RandomTree;

/// Generalization error estimated from each tree's out-of-bag rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorEstimate {
    /// Mean per-tree OOB error rate.
    pub average: f64,
    /// Population standard deviation of the per-tree error rates.
    pub std_dev: f64,
    /// Number of trees with a non-empty OOB set.
    pub n_trees_evaluated: usize,
}

/// Fraction of `oob_rows` a tree misclassifies.
///
/// `oob_rows` must be non-empty.
pub(crate) fn tree_oob_error(
    tree: &RandomTree,
    frame: &DataFrame,
    classes: &[usize],
    oob_rows: &[usize],
) -> f64 {
    let wrong = oob_rows
        .iter()
        .filter(|&&r| tree.classify_row(frame, r) != classes[r])
        .count();
    wrong as f64 / oob_rows.len() as f64
}

/// Mean and population standard deviation.
pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

impl RandomForest {
    /// Estimate the generalization error from out-of-bag rows.
    ///
    /// `data` must be the training dataset, rows in the same order. Each tree
    /// is scored on the rows its bootstrap sample left out; trees whose
    /// sample covered every row are skipped.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::NotTrained`] | the forest has no trees |
    /// | [`RfError::FactorLabelMismatch`] | `data` has different factors |
    /// | [`RfError::MissingValue`] | `data` contains a missing value |
    /// | [`RfError::UnknownClass`] | a transformed label is unknown to the forest |
    /// | [`RfError::OobEvaluationFailed`] | no tree has an OOB row, or `data` has too few rows |
    #[instrument(skip_all, fields(n_trees = self.trees.len(), n_rows = data.n_rows()))]
    pub fn find_average_error(&self, data: &DataFrame) -> Result<ErrorEstimate, RfError> {
        let prepared = self.prepare_training_data(data)?;
        let n_rows = prepared.frame.n_rows();

        let errors: Vec<f64> = self
            .trees
            .par_iter()
            .filter_map(|tree| {
                let oob = tree.oob_rows(n_rows);
                if oob.is_empty() {
                    None
                } else {
                    Some(tree_oob_error(tree, &prepared.frame, &prepared.classes, &oob))
                }
            })
            .collect();

        if errors.is_empty() {
            return Err(RfError::OobEvaluationFailed {
                reason: "no tree has any OOB row".to_string(),
            });
        }

        let (average, std_dev) = mean_std(&errors);
        debug!(average, std_dev, n_trees_evaluated = errors.len(), "OOB error computed");

        Ok(ErrorEstimate {
            average,
            std_dev,
            n_trees_evaluated: errors.len(),
        })
    }
}
