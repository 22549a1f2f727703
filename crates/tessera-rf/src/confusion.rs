//! Confusion matrix, per-class metrics, and the evaluation report handed to
//! reporting sinks.

use std::collections::BTreeMap;
use std::fmt;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{info, instrument};

use crate::data_frame::DataFrame;
use crate::error::RfError;
use crate::forest::RandomForest;
use crate::predict::top_label;

/// A confusion matrix over named classes.
///
/// Entry `matrix[true_class][predicted_class]` counts how many rows with
/// true label `labels[true_class]` were predicted as `labels[predicted_class]`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConfusionMatrix {
    labels: Vec<String>,
    matrix: Vec<Vec<usize>>,
}

/// Per-class precision, recall, and F1 score.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    /// The class label.
    pub class: String,
    /// Precision: TP / (TP + FP). 0.0 if no predictions for this class.
    pub precision: f64,
    /// Recall: TP / (TP + FN). 0.0 if no true rows for this class.
    pub recall: f64,
    /// F1: 2 * precision * recall / (precision + recall). 0.0 if both are zero.
    pub f1: f64,
    /// Number of true rows in this class.
    pub support: usize,
}

impl ConfusionMatrix {
    /// Build a confusion matrix from parallel true and predicted class indices.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | Zero labels provided |
    pub fn from_indices(
        labels: Vec<String>,
        true_classes: &[usize],
        predicted: &[usize],
    ) -> Result<Self, RfError> {
        if true_classes.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        let n_classes = labels.len();
        let mut matrix = vec![vec![0usize; n_classes]; n_classes];
        for (&t, &p) in true_classes.iter().zip(predicted) {
            matrix[t][p] += 1;
        }
        Ok(Self { labels, matrix })
    }

    /// Overall accuracy: proportion of correct predictions.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.n_classes()).map(|i| self.matrix[i][i]).sum();
        let total: usize = self.matrix.iter().flatten().sum();
        if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        }
    }

    /// Mean recall over the classes that have at least one true row.
    #[must_use]
    pub fn balanced_accuracy(&self) -> f64 {
        let recalls: Vec<f64> = self
            .class_metrics()
            .into_iter()
            .filter(|m| m.support > 0)
            .map(|m| m.recall)
            .collect();
        if recalls.is_empty() {
            0.0
        } else {
            recalls.iter().sum::<f64>() / recalls.len() as f64
        }
    }

    /// Per-class precision, recall, F1, and support.
    #[must_use]
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        let n = self.n_classes();
        (0..n)
            .map(|c| {
                let tp = self.matrix[c][c];
                let fp: usize = (0..n).filter(|&i| i != c).map(|i| self.matrix[i][c]).sum();
                let fn_: usize = (0..n).filter(|&j| j != c).map(|j| self.matrix[c][j]).sum();
                let support = tp + fn_;
                let precision = if tp + fp == 0 {
                    0.0
                } else {
                    tp as f64 / (tp + fp) as f64
                };
                let recall = if support == 0 {
                    0.0
                } else {
                    tp as f64 / support as f64
                };
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    class: self.labels[c].clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }

    /// Return the underlying matrix rows.
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    /// Return the class labels in matrix order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.labels.len()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.labels.iter().map(String::len).max().unwrap_or(0).max(7);
        write!(f, "{:>width$}", "")?;
        for label in &self.labels {
            write!(f, " {label:>width$}")?;
        }
        writeln!(f)?;

        for (label, row) in self.labels.iter().zip(&self.matrix) {
            write!(f, "{label:>width$}")?;
            for val in row {
                write!(f, " {val:>width$}")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

/// The forest's scores for one evaluated row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowScores {
    /// Row index within the evaluated (label-transformed) dataset.
    pub row: usize,
    /// The row's label after the forest's label transformation.
    pub true_label: String,
    /// The label with the most votes.
    pub predicted_label: String,
    /// Vote fraction per class, as from
    /// [`classify_vector`](RandomForest::classify_vector).
    pub scores: BTreeMap<String, f64>,
}

/// Everything a reporting sink needs to present one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    /// Per-row scores in dataset order.
    pub rows: Vec<RowScores>,
    /// Confusion matrix over the forest's class labels.
    pub confusion: ConfusionMatrix,
}

impl EvaluationReport {
    /// Overall accuracy of the evaluated rows.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        self.confusion.accuracy()
    }

    /// Balanced accuracy of the evaluated rows.
    #[must_use]
    pub fn balanced_accuracy(&self) -> f64 {
        self.confusion.balanced_accuracy()
    }
}

impl RandomForest {
    /// Classify every row of `data` and tabulate the results.
    ///
    /// The forest's label transformation is applied to `data` first, so a
    /// one-vs-rest forest reports against `[positive, "other"]` and a
    /// one-vs-one forest evaluates only the rows of its two classes.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::NotTrained`] | the forest has no trees |
    /// | [`RfError::FactorLabelMismatch`] | `data` has different factors |
    /// | [`RfError::UnknownClass`] | a transformed label is unknown to the forest |
    /// | [`RfError::EmptyDataset`] | no row takes part in the evaluation |
    #[instrument(skip_all, fields(n_rows = data.n_rows()))]
    pub fn evaluate(&self, data: &DataFrame) -> Result<EvaluationReport, RfError> {
        self.require_trained()?;
        self.check_factors(data)?;
        let strategy = self.strategy.as_ref().ok_or(RfError::NotTrained)?;
        let prepared = strategy.prepare_with(data, self.class_labels.clone())?;
        let frame = &prepared.frame;

        let predictions: Vec<(usize, BTreeMap<String, f64>)> = (0..frame.n_rows())
            .into_par_iter()
            .map(|r| {
                let scores = self.classify_vector(frame.row(r))?;
                let predicted = top_label(&scores)
                    .and_then(|label| self.class_labels.iter().position(|c| c == label))
                    .ok_or(RfError::NotTrained)?;
                Ok((predicted, scores))
            })
            .collect::<Result<_, RfError>>()?;

        let predicted: Vec<usize> = predictions.iter().map(|(p, _)| *p).collect();
        let confusion =
            ConfusionMatrix::from_indices(
                self.class_labels.clone(),
                &prepared.classes,
                &predicted,
            )?;

        let rows = predictions
            .into_iter()
            .enumerate()
            .map(|(row, (p, scores))| RowScores {
                row,
                true_label: frame.class_label(row).to_string(),
                predicted_label: self.class_labels[p].clone(),
                scores,
            })
            .collect();

        let report = EvaluationReport { rows, confusion };
        info!(
            accuracy = report.accuracy(),
            balanced_accuracy = report.balanced_accuracy(),
            "evaluation complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn perfect_predictions() {
        let truth = vec![0, 0, 1, 1, 2, 2];
        let cm = ConfusionMatrix::from_indices(labels(&["a", "b", "c"]), &truth, &truth).unwrap();
        assert!((cm.accuracy() - 1.0).abs() < f64::EPSILON);
        assert!((cm.balanced_accuracy() - 1.0).abs() < f64::EPSILON);
        for m in cm.class_metrics() {
            assert!((m.f1 - 1.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn known_confusion_matrix() {
        let truth = vec![0, 0, 0, 1, 1, 1, 2, 2, 2];
        let predicted = vec![0, 0, 1, 1, 1, 2, 2, 2, 0];
        let cm =
            ConfusionMatrix::from_indices(labels(&["a", "b", "c"]), &truth, &predicted).unwrap();
        let metrics = cm.class_metrics();
        assert_eq!(metrics[0].class, "a");
        assert!((metrics[0].precision - 2.0 / 3.0).abs() < 1e-10);
        assert!((metrics[0].recall - 2.0 / 3.0).abs() < 1e-10);
        assert_eq!(metrics[0].support, 3);
        assert!((cm.accuracy() - 6.0 / 9.0).abs() < 1e-10);
    }

    #[test]
    fn balanced_accuracy_weighs_classes_equally() {
        // 8 majority rows all right, 2 minority rows both wrong.
        let truth = vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 1];
        let predicted = vec![0; 10];
        let cm =
            ConfusionMatrix::from_indices(labels(&["maj", "min"]), &truth, &predicted).unwrap();
        assert!((cm.accuracy() - 0.8).abs() < 1e-10);
        assert!((cm.balanced_accuracy() - 0.5).abs() < 1e-10);
    }

    #[test]
    fn empty_labels_error() {
        let err = ConfusionMatrix::from_indices(labels(&["a"]), &[], &[]).unwrap_err();
        assert!(matches!(err, RfError::EmptyDataset));
    }

    #[test]
    fn display_shows_labels() {
        let cm = ConfusionMatrix::from_indices(labels(&["yes", "no"]), &[0, 1], &[0, 1]).unwrap();
        let output = format!("{cm}");
        assert!(output.contains("yes"));
        assert!(output.contains("no"));
    }

    #[test]
    fn evaluate_binary_forest() {
        let mut data = DataFrame::new(vec!["x".into()]);
        for i in 0..10 {
            data.push_row(vec![i as f64], "A").unwrap();
            data.push_row(vec![50.0 + i as f64], "B").unwrap();
            data.push_row(vec![100.0 + i as f64], "C").unwrap();
        }
        let mut forest = RandomForest::new();
        forest.train_binary(&data, 20, 1, "A", 1, 1.0, false).unwrap();
        let report = forest.evaluate(&data).unwrap();
        assert_eq!(report.rows.len(), 30);
        assert_eq!(report.confusion.labels(), &["A", "other"]);
        assert_eq!(report.rows[1].true_label, "other");
        assert!(report.accuracy() > 0.9);
        let total: f64 = report.rows[0].scores.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }
}
