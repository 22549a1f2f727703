//! Prediction methods for the Random Forest ensemble.

use std::collections::BTreeMap;

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::RfError;
use crate::forest::RandomForest;

/// The highest-scoring label; ties go to the lexicographically smallest.
pub(crate) fn top_label(scores: &BTreeMap<String, f64>) -> Option<&String> {
    let mut best: Option<(&String, f64)> = None;
    for (label, &score) in scores {
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((label, score));
        }
    }
    best.map(|(label, _)| label)
}

impl RandomForest {
    /// Count the votes each class receives for one vector.
    pub(crate) fn vote_counts(&self, vector: &[f64]) -> Result<Vec<usize>, RfError> {
        self.require_trained()?;
        if vector.len() != self.factor_labels.len() {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.factor_labels.len(),
                got: vector.len(),
            });
        }
        let mut votes = vec![0usize; self.class_labels.len()];
        for tree in &self.trees {
            votes[tree.classify(vector)?] += 1;
        }
        Ok(votes)
    }

    /// Return the fraction of trees voting for each class.
    ///
    /// Only classes with at least one vote appear; the values sum to 1.0.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::NotTrained`] | the forest has no trees |
    /// | [`RfError::PredictionFeatureMismatch`] | `vector.len()` differs from the factor count |
    pub fn classify_vector(&self, vector: &[f64]) -> Result<BTreeMap<String, f64>, RfError> {
        let votes = self.vote_counts(vector)?;
        let n = self.trees.len() as f64;
        Ok(self
            .class_labels
            .iter()
            .zip(votes)
            .filter(|&(_, v)| v > 0)
            .map(|(label, v)| (label.clone(), v as f64 / n))
            .collect())
    }

    /// Return the label with the most votes.
    ///
    /// Ties go to the lexicographically smallest label.
    ///
    /// # Errors
    ///
    /// As [`classify_vector`](Self::classify_vector).
    pub fn predict_label(&self, vector: &[f64]) -> Result<String, RfError> {
        let scores = self.classify_vector(vector)?;
        top_label(&scores).cloned().ok_or(RfError::NotTrained)
    }

    /// Classify many vectors in parallel.
    ///
    /// # Errors
    ///
    /// As [`classify_vector`](Self::classify_vector), for the first failing vector.
    pub fn classify_batch(
        &self,
        vectors: &[Vec<f64>],
    ) -> Result<Vec<BTreeMap<String, f64>>, RfError> {
        vectors
            .into_par_iter()
            .map(|vector| self.classify_vector(vector))
            .collect()
    }
}
