//! Configuration builder for Random Forest training.

use crate::error::RfError;
use crate::split::SplitCriterion;
use crate::strategy::LabelStrategy;

/// Configuration for one training run.
///
/// Construct via [`TrainingConfig::new`], then chain `with_*` methods. The
/// dataset is passed to [`RandomForest::train`](crate::RandomForest::train)
/// separately; `num_factors` is checked against it there.
///
/// # Defaults
///
/// | Parameter   | Default |
/// |-------------|---------|
/// | `node_size` | 1       |
/// | `retrain`   | 1.0     |
/// | `balanced`  | `false` |
/// | `criterion` | `Gini`  |
/// | `seed`      | 42      |
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub(crate) n_trees: usize,
    pub(crate) num_factors: usize,
    pub(crate) node_size: usize,
    pub(crate) retrain: f64,
    pub(crate) balanced: bool,
    pub(crate) strategy: LabelStrategy,
    pub(crate) criterion: SplitCriterion,
    pub(crate) seed: u64,
}

impl TrainingConfig {
    /// Create a config growing `n_trees` trees that try `num_factors`
    /// candidate factors at each split.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidTreeCount`] if `n_trees` is zero.
    pub fn new(
        n_trees: usize,
        num_factors: usize,
        strategy: LabelStrategy,
    ) -> Result<Self, RfError> {
        if n_trees == 0 {
            return Err(RfError::InvalidTreeCount { n_trees });
        }
        Ok(Self {
            n_trees,
            num_factors,
            node_size: 1,
            retrain: 1.0,
            balanced: false,
            strategy,
            criterion: SplitCriterion::Gini,
            seed: 42,
        })
    }

    // --- Setters ---

    /// Set the largest node that is never split further.
    #[must_use]
    pub fn with_node_size(mut self, node_size: usize) -> Self {
        self.node_size = node_size;
        self
    }

    /// Set the fraction of factors kept for a second training pass.
    /// `1.0` disables retraining.
    #[must_use]
    pub fn with_retrain(mut self, retrain: f64) -> Self {
        self.retrain = retrain;
        self
    }

    /// Draw class-balanced bootstrap samples.
    #[must_use]
    pub fn with_balanced(mut self, balanced: bool) -> Self {
        self.balanced = balanced;
        self
    }

    /// Set the split quality criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the number of candidate factors tried per split.
    #[must_use]
    pub fn num_factors(&self) -> usize {
        self.num_factors
    }

    /// Return the node size.
    #[must_use]
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Return the retrain fraction.
    #[must_use]
    pub fn retrain(&self) -> f64 {
        self.retrain
    }

    /// Return whether bootstrap samples are class-balanced.
    #[must_use]
    pub fn balanced(&self) -> bool {
        self.balanced
    }

    /// Return the label strategy.
    #[must_use]
    pub fn strategy(&self) -> &LabelStrategy {
        &self.strategy
    }

    /// Return the split criterion.
    #[must_use]
    pub fn criterion(&self) -> SplitCriterion {
        self.criterion
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Check the scalar parameters against a dataset with `n_factors` factors.
    pub(crate) fn validate(&self, n_factors: usize) -> Result<(), RfError> {
        if self.n_trees == 0 {
            return Err(RfError::InvalidTreeCount {
                n_trees: self.n_trees,
            });
        }
        if self.num_factors == 0 || self.num_factors > n_factors {
            return Err(RfError::InvalidSplitFactorCount {
                num_factors: self.num_factors,
                n_factors,
            });
        }
        if self.node_size == 0 {
            return Err(RfError::InvalidNodeSize {
                node_size: self.node_size,
            });
        }
        if !(self.retrain > 0.0 && self.retrain <= 1.0) {
            return Err(RfError::InvalidRetrainFraction {
                retrain: self.retrain,
            });
        }
        Ok(())
    }
}
