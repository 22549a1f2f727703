//! Label transformations applied to a dataset before tree induction.

use std::fmt;

use crate::data_frame::DataFrame;
use crate::error::RfError;

/// Class label assigned to every non-positive row in one-vs-rest training.
pub const NEGATIVE_CLASS_LABEL: &str = "other";

/// How row labels are prepared before the trees are grown.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LabelStrategy {
    /// One-vs-rest: rows not labeled `positive` become [`NEGATIVE_CLASS_LABEL`].
    OneVsRest {
        /// The positive class.
        positive: String,
    },
    /// Labels are used as-is.
    Multiclass,
    /// One-vs-one: only rows labeled `positive` or `negative` participate.
    OneVsOne {
        /// The positive class.
        positive: String,
        /// The negative class.
        negative: String,
    },
}

/// A dataset after label transformation, with its class order fixed.
#[derive(Debug, Clone)]
pub(crate) struct PreparedData {
    /// The participating rows with transformed labels.
    pub(crate) frame: DataFrame,
    /// Class labels in the order leaves refer to them.
    pub(crate) class_labels: Vec<String>,
    /// `classes[row]` is the index of the row's label in `class_labels`.
    pub(crate) classes: Vec<usize>,
}

impl LabelStrategy {
    /// Check that the classes named by this strategy occur in `data`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::UnknownClass`] | a named class has no rows |
    /// | [`RfError::DuplicateClassPair`] | one-vs-one names the same class twice |
    pub fn validate(&self, data: &DataFrame) -> Result<(), RfError> {
        match self {
            LabelStrategy::OneVsRest { positive } => require_class(data, positive),
            LabelStrategy::Multiclass => Ok(()),
            LabelStrategy::OneVsOne { positive, negative } => {
                if positive == negative {
                    return Err(RfError::DuplicateClassPair {
                        class: positive.clone(),
                    });
                }
                require_class(data, positive)?;
                require_class(data, negative)
            }
        }
    }

    /// Return the class order the forest's leaves use for `data`.
    pub(crate) fn class_order(&self, data: &DataFrame) -> Vec<String> {
        match self {
            LabelStrategy::OneVsRest { positive } => {
                vec![positive.clone(), NEGATIVE_CLASS_LABEL.to_string()]
            }
            LabelStrategy::Multiclass => data.distinct_classes(),
            LabelStrategy::OneVsOne { positive, negative } => {
                vec![positive.clone(), negative.clone()]
            }
        }
    }

    /// Apply the transformation and encode labels against `class_labels`.
    pub(crate) fn prepare_with(
        &self,
        data: &DataFrame,
        class_labels: Vec<String>,
    ) -> Result<PreparedData, RfError> {
        let frame = match self {
            LabelStrategy::OneVsRest { positive } => data.map_classes(|c| {
                if c == positive.as_str() {
                    c.to_string()
                } else {
                    NEGATIVE_CLASS_LABEL.to_string()
                }
            }),
            LabelStrategy::Multiclass => data.clone(),
            LabelStrategy::OneVsOne { positive, negative } => {
                data.filter_classes(|c| c == positive.as_str() || c == negative.as_str())
            }
        };
        let classes = frame.encode_classes(&class_labels)?;
        Ok(PreparedData {
            frame,
            class_labels,
            classes,
        })
    }

    /// Validate, apply, and encode in one step for a training run.
    pub(crate) fn prepare(&self, data: &DataFrame) -> Result<PreparedData, RfError> {
        self.validate(data)?;
        self.prepare_with(data, self.class_order(data))
    }
}

fn require_class(data: &DataFrame, class: &str) -> Result<(), RfError> {
    if data.contains_class(class) {
        Ok(())
    } else {
        Err(RfError::UnknownClass {
            class: class.to_string(),
        })
    }
}

impl fmt::Display for LabelStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelStrategy::OneVsRest { positive } => write!(f, "binary:{positive}"),
            LabelStrategy::Multiclass => f.write_str("multiclass"),
            LabelStrategy::OneVsOne { positive, negative } => {
                write!(f, "roundrobin:{positive}:{negative}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        DataFrame::from_rows(
            vec!["x".into()],
            vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]],
            vec!["a".into(), "b".into(), "c".into(), "a".into()],
        )
        .unwrap()
    }

    #[test]
    fn one_vs_rest_relabels_negatives() {
        let strategy = LabelStrategy::OneVsRest {
            positive: "a".into(),
        };
        let prepared = strategy.prepare(&frame()).unwrap();
        assert_eq!(prepared.class_labels, vec!["a".to_string(), "other".to_string()]);
        assert_eq!(prepared.classes, vec![0, 1, 1, 0]);
        assert_eq!(prepared.frame.n_rows(), 4);
    }

    #[test]
    fn multiclass_keeps_labels() {
        let prepared = LabelStrategy::Multiclass.prepare(&frame()).unwrap();
        assert_eq!(prepared.class_labels.len(), 3);
        assert_eq!(prepared.classes, vec![0, 1, 2, 0]);
    }

    #[test]
    fn one_vs_one_drops_other_rows() {
        let strategy = LabelStrategy::OneVsOne {
            positive: "c".into(),
            negative: "a".into(),
        };
        let prepared = strategy.prepare(&frame()).unwrap();
        assert_eq!(prepared.frame.n_rows(), 3);
        assert_eq!(prepared.classes, vec![1, 0, 1]);
    }

    #[test]
    fn unknown_class_rejected() {
        let strategy = LabelStrategy::OneVsRest {
            positive: "zzz".into(),
        };
        assert!(matches!(
            strategy.prepare(&frame()),
            Err(RfError::UnknownClass { .. })
        ));
        let pair = LabelStrategy::OneVsOne {
            positive: "a".into(),
            negative: "a".into(),
        };
        assert!(matches!(
            pair.validate(&frame()),
            Err(RfError::DuplicateClassPair { .. })
        ));
    }

    #[test]
    fn display_names_strategy() {
        let strategy = LabelStrategy::OneVsOne {
            positive: "match".into(),
            negative: "miss".into(),
        };
        assert_eq!(strategy.to_string(), "roundrobin:match:miss");
        assert_eq!(LabelStrategy::Multiclass.to_string(), "multiclass");
    }
}
