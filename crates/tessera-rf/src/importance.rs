//! Permutation-based factor importance.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, instrument};

use crate::data_frame::DataFrame;
use crate::error::RfError;
use crate::forest::RandomForest;
use crate::oob::{mean_std, tree_oob_error};
use crate::tree::RandomTree;

/// Permutation importance of a single factor.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorImportance {
    /// Factor name.
    pub name: String,
    /// Mean increase in OOB error when this factor is permuted.
    pub importance: f64,
    /// Population standard deviation of the increase across trees.
    pub std: f64,
    /// Rank (1 = most important).
    pub rank: usize,
}

/// Per-factor error increase, averaged over the trees that have OOB rows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct FactorScore {
    pub(crate) mean: f64,
    pub(crate) std: f64,
}

/// OOB error of a tree after shuffling `factor` among the OOB rows.
fn permuted_error(
    tree: &RandomTree,
    frame: &DataFrame,
    classes: &[usize],
    oob_rows: &[usize],
    factor: usize,
    rng: &mut ChaCha8Rng,
) -> f64 {
    let mut permuted: Vec<f64> = oob_rows.iter().map(|&r| frame.value(r, factor)).collect();
    permuted.shuffle(rng);

    let mut vector = Vec::with_capacity(frame.n_factors());
    let wrong = oob_rows
        .iter()
        .zip(&permuted)
        .filter(|&(&r, &value)| {
            vector.clear();
            vector.extend_from_slice(frame.row(r));
            vector[factor] = value;
            tree.leaf_class_of(&vector) != classes[r]
        })
        .count();
    wrong as f64 / oob_rows.len() as f64
}

/// Score every factor by how much permuting it raises each tree's OOB error.
///
/// For every tree with OOB rows and every factor, the factor's values are
/// shuffled across that tree's OOB rows and the error increase over the
/// unpermuted baseline is recorded. Returns `None` when no tree has OOB rows.
pub(crate) fn permutation_importance(
    trees: &[RandomTree],
    frame: &DataFrame,
    classes: &[usize],
    n_factors: usize,
    seed: u64,
) -> Option<Vec<FactorScore>> {
    let n_rows = frame.n_rows();

    let increases: Vec<Vec<f64>> = trees
        .par_iter()
        .enumerate()
        .filter_map(|(tree_idx, tree)| {
            let oob = tree.oob_rows(n_rows);
            if oob.is_empty() {
                return None;
            }
            let baseline = tree_oob_error(tree, frame, classes, &oob);
            let per_factor = (0..n_factors)
                .map(|factor| {
                    let rng_seed = seed
                        .wrapping_add((tree_idx as u64).wrapping_mul(n_factors as u64))
                        .wrapping_add(factor as u64);
                    let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
                    permuted_error(tree, frame, classes, &oob, factor, &mut rng) - baseline
                })
                .collect();
            Some(per_factor)
        })
        .collect();

    if increases.is_empty() {
        return None;
    }

    debug!(n_trees_evaluated = increases.len(), n_factors, "permutation importance computed");

    Some(
        (0..n_factors)
            .map(|factor| {
                let values: Vec<f64> = increases.iter().map(|tree| tree[factor]).collect();
                let (mean, std) = mean_std(&values);
                FactorScore { mean, std }
            })
            .collect(),
    )
}

/// Indices of the `keep` highest-scoring factors, in ascending index order.
///
/// Equal scores favor the lower index.
pub(crate) fn top_factors(scores: &[FactorScore], keep: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].mean.total_cmp(&scores[a].mean));
    order.truncate(keep);
    order.sort_unstable();
    order
}

impl RandomForest {
    /// Rank the factors by permutation importance on the OOB rows.
    ///
    /// `data` must be the training dataset, rows in the same order. Results
    /// are sorted by descending importance.
    ///
    /// # Errors
    ///
    /// As [`find_average_error`](Self::find_average_error).
    #[instrument(skip_all, fields(n_trees = self.trees.len(), n_rows = data.n_rows()))]
    pub fn factor_importance(&self, data: &DataFrame) -> Result<Vec<FactorImportance>, RfError> {
        let prepared = self.prepare_training_data(data)?;
        let scores = permutation_importance(
            &self.trees,
            &prepared.frame,
            &prepared.classes,
            self.factor_labels.len(),
            self.seed,
        )
        .ok_or_else(|| RfError::OobEvaluationFailed {
            reason: "no tree has any OOB row".to_string(),
        })?;

        let mut results: Vec<FactorImportance> = self
            .factor_labels
            .iter()
            .zip(scores)
            .map(|(name, score)| FactorImportance {
                name: name.clone(),
                importance: score.mean,
                std: score.std,
                rank: 0, // set after sorting
            })
            .collect();

        results.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        for (i, result) in results.iter_mut().enumerate() {
            result.rank = i + 1;
        }
        Ok(results)
    }

    /// Return permutation importance keyed by factor name.
    ///
    /// # Errors
    ///
    /// As [`factor_importance`](Self::factor_importance).
    pub fn factor_importance_map(
        &self,
        data: &DataFrame,
    ) -> Result<BTreeMap<String, f64>, RfError> {
        Ok(self
            .factor_importance(data)?
            .into_iter()
            .map(|f| (f.name, f.importance))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Factor 0 separates three classes; factor 1 is constant.
    fn make_data() -> DataFrame {
        let mut data = DataFrame::new(vec!["informative".into(), "noise".into()]);
        for (label, base) in [("a", 0.0), ("b", 10.0), ("c", 20.0)] {
            for i in 0..30 {
                data.push_row(vec![base + i as f64 * 0.1, 0.5], label).unwrap();
            }
        }
        data
    }

    fn trained(data: &DataFrame) -> RandomForest {
        let mut forest = RandomForest::new();
        forest.train_multiclass(data, 50, 2, 1, 1.0, false).unwrap();
        forest
    }

    #[test]
    fn informative_factor_high_importance() {
        let data = make_data();
        let imp = trained(&data).factor_importance(&data).unwrap();
        assert_eq!(imp.len(), 2);
        let informative = imp.iter().find(|f| f.name == "informative").unwrap();
        let noise = imp.iter().find(|f| f.name == "noise").unwrap();
        assert!(informative.importance > noise.importance);
        assert!(
            informative.importance > 0.1,
            "informative importance should be substantial: {}",
            informative.importance
        );
        assert_eq!(informative.rank, 1);
    }

    #[test]
    fn constant_factor_exactly_zero() {
        let data = make_data();
        let map = trained(&data).factor_importance_map(&data).unwrap();
        // Shuffling identical values changes nothing.
        assert_eq!(map["noise"], 0.0);
    }

    #[test]
    fn importance_is_reproducible() {
        let data = make_data();
        let forest = trained(&data);
        assert_eq!(
            forest.factor_importance(&data).unwrap(),
            forest.factor_importance(&data).unwrap()
        );
    }

    #[test]
    fn top_factors_orders_by_score() {
        let scores = [
            FactorScore { mean: 0.1, std: 0.0 },
            FactorScore { mean: 0.5, std: 0.0 },
            FactorScore { mean: 0.0, std: 0.0 },
            FactorScore { mean: 0.5, std: 0.0 },
        ];
        assert_eq!(top_factors(&scores, 1), vec![1]);
        assert_eq!(top_factors(&scores, 3), vec![0, 1, 3]);
    }
}
