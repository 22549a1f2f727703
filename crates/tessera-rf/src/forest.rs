//! Random Forest training with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::config::TrainingConfig;
use crate::data_frame::DataFrame;
use crate::error::RfError;
use crate::importance::{FactorScore, permutation_importance, top_factors};
use crate::split::CandidateFactors;
use crate::strategy::{LabelStrategy, PreparedData};
use crate::tree::{InductionParams, RandomTree};

/// A Random Forest ensemble.
///
/// A freshly constructed forest is untrained: every read operation returns
/// [`RfError::NotTrained`] until [`train`](Self::train) or an import succeeds.
/// Mutating operations take `&mut self` and replace the whole state at once,
/// so a failed call leaves the forest as it was.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RandomForest {
    pub(crate) trees: Vec<RandomTree>,
    pub(crate) factor_labels: Vec<String>,
    pub(crate) class_labels: Vec<String>,
    pub(crate) num_split_factors: usize,
    pub(crate) node_size: usize,
    pub(crate) strategy: Option<LabelStrategy>,
    pub(crate) retained_factors: Vec<usize>,
    pub(crate) seed: u64,
}

/// Grow `n_trees` trees in parallel, each on its own bootstrap sample.
fn grow_trees(
    prepared: &PreparedData,
    config: &TrainingConfig,
    candidates: CandidateFactors<'_>,
    master_rng: &mut ChaCha8Rng,
) -> Vec<RandomTree> {
    let tree_seeds: Vec<u64> = (0..config.n_trees).map(|_| master_rng.r#gen()).collect();
    let params = InductionParams {
        candidates,
        node_size: config.node_size,
        criterion: config.criterion,
        n_classes: prepared.class_labels.len(),
    };
    let frame = &prepared.frame;
    let n_rows = frame.n_rows();
    let balanced = config.balanced;

    tree_seeds
        .into_par_iter()
        .map(|seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let sample = if balanced {
                frame.sample_balanced(&mut rng)
            } else {
                frame.sample_with_replacement(n_rows, &mut rng)
            };
            RandomTree::induce(frame, &prepared.classes, &sample, &params, &mut rng)
        })
        .collect()
}

impl RandomForest {
    /// Create an untrained forest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Train the forest on `data`, replacing any previous state.
    ///
    /// Labels are transformed by the config's [`LabelStrategy`], then
    /// `n_trees` trees are grown in parallel on bootstrap samples. When
    /// `retrain < 1.0`, the top `ceil(retrain * n_factors)` factors by
    /// permutation importance are kept and the trees are grown again on
    /// those factors only.
    ///
    /// # Errors
    ///
    /// | Variant                             | When                                              |
    /// |-------------------------------------|---------------------------------------------------|
    /// | [`RfError::EmptyDataset`]           | `data` has no rows                                |
    /// | [`RfError::InvalidTreeCount`]       | `n_trees` is zero                                 |
    /// | [`RfError::InvalidSplitFactorCount`]| `num_factors` is outside `[1, n_factors]`         |
    /// | [`RfError::InvalidNodeSize`]        | `node_size` is zero                               |
    /// | [`RfError::InvalidRetrainFraction`] | `retrain` is not in `(0.0, 1.0]`                  |
    /// | [`RfError::UnknownClass`]           | a class named by the strategy has no rows         |
    /// | [`RfError::DuplicateClassPair`]     | one-vs-one names the same class twice             |
    /// | [`RfError::MissingValue`]           | `data` still contains a missing value             |
    #[instrument(
        skip_all,
        fields(n_trees = config.n_trees, n_rows = data.n_rows(), strategy = %config.strategy)
    )]
    pub fn train(&mut self, data: &DataFrame, config: &TrainingConfig) -> Result<(), RfError> {
        // --- Validate inputs ---
        if data.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        let n_factors = data.n_factors();
        config.validate(n_factors)?;
        if let Some((row, factor)) = data.first_missing() {
            return Err(RfError::MissingValue { row, factor });
        }

        let prepared = config.strategy.prepare(data)?;

        info!(
            n_rows = prepared.frame.n_rows(),
            n_factors,
            n_classes = prepared.class_labels.len(),
            num_factors = config.num_factors,
            node_size = config.node_size,
            balanced = config.balanced,
            "training random forest"
        );

        let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut retained: Vec<usize> = (0..n_factors).collect();
        let mut num_split_factors = config.num_factors;

        let mut trees = grow_trees(
            &prepared,
            config,
            CandidateFactors {
                pool: &retained,
                per_split: num_split_factors,
            },
            &mut master_rng,
        );

        if config.retrain < 1.0 {
            let keep = ((config.retrain * n_factors as f64).ceil() as usize).clamp(1, n_factors);
            let importance = permutation_importance(
                &trees,
                &prepared.frame,
                &prepared.classes,
                n_factors,
                config.seed,
            )
            .unwrap_or_else(|| vec![FactorScore::default(); n_factors]);
            retained = top_factors(&importance, keep);
            num_split_factors = num_split_factors.min(retained.len());

            debug!(
                n_retained = retained.len(),
                num_split_factors, "retraining on most important factors"
            );

            trees = grow_trees(
                &prepared,
                config,
                CandidateFactors {
                    pool: &retained,
                    per_split: num_split_factors,
                },
                &mut master_rng,
            );
        }

        debug!(n_trees_trained = trees.len(), "tree training complete");

        *self = RandomForest {
            trees,
            factor_labels: data.factor_labels().to_vec(),
            class_labels: prepared.class_labels,
            num_split_factors,
            node_size: config.node_size,
            strategy: Some(config.strategy.clone()),
            retained_factors: retained,
            seed: config.seed,
        };

        info!(n_trees = self.trees.len(), "random forest training complete");
        Ok(())
    }

    /// Train one-vs-rest: `pos_class` against every other row relabeled
    /// [`NEGATIVE_CLASS_LABEL`](crate::NEGATIVE_CLASS_LABEL).
    ///
    /// # Errors
    ///
    /// As [`train`](Self::train).
    #[allow(clippy::too_many_arguments)]
    pub fn train_binary(
        &mut self,
        data: &DataFrame,
        n_trees: usize,
        num_factors: usize,
        pos_class: &str,
        node_size: usize,
        retrain: f64,
        balanced: bool,
    ) -> Result<(), RfError> {
        let strategy = LabelStrategy::OneVsRest {
            positive: pos_class.to_string(),
        };
        let config = TrainingConfig::new(n_trees, num_factors, strategy)?
            .with_node_size(node_size)
            .with_retrain(retrain)
            .with_balanced(balanced);
        self.train(data, &config)
    }

    /// Train on the labels as they are.
    ///
    /// # Errors
    ///
    /// As [`train`](Self::train).
    pub fn train_multiclass(
        &mut self,
        data: &DataFrame,
        n_trees: usize,
        num_factors: usize,
        node_size: usize,
        retrain: f64,
        balanced: bool,
    ) -> Result<(), RfError> {
        let config = TrainingConfig::new(n_trees, num_factors, LabelStrategy::Multiclass)?
            .with_node_size(node_size)
            .with_retrain(retrain)
            .with_balanced(balanced);
        self.train(data, &config)
    }

    /// Train one-vs-one on the rows labeled `pos_class` or `neg_class`.
    ///
    /// # Errors
    ///
    /// As [`train`](Self::train).
    #[allow(clippy::too_many_arguments)]
    pub fn train_round_robin(
        &mut self,
        data: &DataFrame,
        n_trees: usize,
        num_factors: usize,
        pos_class: &str,
        neg_class: &str,
        node_size: usize,
        retrain: f64,
        balanced: bool,
    ) -> Result<(), RfError> {
        let strategy = LabelStrategy::OneVsOne {
            positive: pos_class.to_string(),
            negative: neg_class.to_string(),
        };
        let config = TrainingConfig::new(n_trees, num_factors, strategy)?
            .with_node_size(node_size)
            .with_retrain(retrain)
            .with_balanced(balanced);
        self.train(data, &config)
    }

    /// Discard every tree and all training metadata.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Fill missing values in a training dataset with class-conditional medians.
    ///
    /// Returns the number of entries filled. See
    /// [`DataFrame::replace_missing_with_class_medians`].
    pub fn replace_missing_training_values(data: &mut DataFrame) -> usize {
        data.replace_missing_with_class_medians()
    }

    /// Return `true` once the forest holds at least one tree.
    #[must_use]
    pub fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Borrow the trees.
    #[must_use]
    pub fn trees(&self) -> &[RandomTree] {
        &self.trees
    }

    /// Return the factor names the forest was trained on.
    #[must_use]
    pub fn factor_labels(&self) -> &[String] {
        &self.factor_labels
    }

    /// Return the class labels in the order tree leaves refer to them.
    #[must_use]
    pub fn class_labels(&self) -> &[String] {
        &self.class_labels
    }

    /// Return the number of candidate factors tried per split.
    #[must_use]
    pub fn num_split_factors(&self) -> usize {
        self.num_split_factors
    }

    /// Return the node size the trees were grown with.
    #[must_use]
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Return the label strategy, or `None` for an untrained forest.
    #[must_use]
    pub fn strategy(&self) -> Option<&LabelStrategy> {
        self.strategy.as_ref()
    }

    /// Return the factor indices the trees were allowed to split on.
    #[must_use]
    pub fn retained_factors(&self) -> &[usize] {
        &self.retained_factors
    }

    /// Return the seed of the last training run.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub(crate) fn require_trained(&self) -> Result<(), RfError> {
        if self.is_trained() {
            Ok(())
        } else {
            Err(RfError::NotTrained)
        }
    }

    /// Check that `data` has the forest's factors in the forest's order.
    pub(crate) fn check_factors(&self, data: &DataFrame) -> Result<(), RfError> {
        if data.factor_labels() != self.factor_labels.as_slice() {
            return Err(RfError::FactorLabelMismatch);
        }
        Ok(())
    }

    /// Re-apply the training label strategy to the training dataset.
    ///
    /// Tree bags index into the result, so `data` must be the dataset the
    /// forest was trained on, with its rows in the same order.
    pub(crate) fn prepare_training_data(&self, data: &DataFrame) -> Result<PreparedData, RfError> {
        self.require_trained()?;
        self.check_factors(data)?;
        if let Some((row, factor)) = data.first_missing() {
            return Err(RfError::MissingValue { row, factor });
        }
        let strategy = self.strategy.as_ref().ok_or(RfError::NotTrained)?;
        let prepared = strategy.prepare_with(data, self.class_labels.clone())?;

        let n_rows = prepared.frame.n_rows();
        let max_bagged = self.trees.iter().filter_map(|t| t.bag().last()).max();
        if let Some(&max_bagged) = max_bagged {
            if max_bagged >= n_rows {
                return Err(RfError::OobEvaluationFailed {
                    reason: format!(
                        "dataset has {n_rows} participating rows but a tree bagged row {max_bagged}"
                    ),
                });
            }
        }
        Ok(prepared)
    }
}
