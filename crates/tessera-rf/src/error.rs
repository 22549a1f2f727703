/// Errors from Random Forest operations.
///
/// Variants fall into three groups: configuration errors detected before any
/// tree is built, usage errors for operations invoked in the wrong forest
/// state, and malformed-model errors raised while importing.
#[derive(Debug, thiserror::Error)]
pub enum RfError {
    /// Returned when the training dataset has zero rows.
    #[error("training dataset has zero rows")]
    EmptyDataset,

    /// Returned when n_trees is zero.
    #[error("n_trees must be at least 1, got {n_trees}")]
    InvalidTreeCount {
        /// The invalid n_trees value provided.
        n_trees: usize,
    },

    /// Returned when the number of candidate split factors is zero or exceeds
    /// the number of factors in the dataset.
    #[error("num_factors must be in [1, {n_factors}], got {num_factors}")]
    InvalidSplitFactorCount {
        /// The requested number of candidate factors per split.
        num_factors: usize,
        /// The number of factors in the dataset.
        n_factors: usize,
    },

    /// Returned when node_size is zero.
    #[error("node_size must be at least 1, got {node_size}")]
    InvalidNodeSize {
        /// The invalid node_size value provided.
        node_size: usize,
    },

    /// Returned when the retrain fraction is not in (0.0, 1.0].
    #[error("retrain fraction must be in (0.0, 1.0], got {retrain}")]
    InvalidRetrainFraction {
        /// The invalid retrain fraction provided.
        retrain: f64,
    },

    /// Returned when a named class does not occur among the row labels.
    #[error("class \"{class}\" does not occur in the training labels")]
    UnknownClass {
        /// The class name that was not found.
        class: String,
    },

    /// Returned when a one-vs-one run names the same class twice.
    #[error("positive and negative class are both \"{class}\"")]
    DuplicateClassPair {
        /// The repeated class name.
        class: String,
    },

    /// Returned when a training row still contains a missing value.
    #[error("missing value at row {row}, factor {factor}; impute before training")]
    MissingValue {
        /// The zero-based row index.
        row: usize,
        /// The zero-based factor index.
        factor: usize,
    },

    /// Returned when a value is infinite.
    #[error("non-finite value at row {row}, factor {factor}")]
    NonFiniteValue {
        /// The zero-based row index.
        row: usize,
        /// The zero-based factor index.
        factor: usize,
    },

    /// Returned when a row pushed into a dataset has the wrong length.
    #[error("row {row} has {got} values, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of factors.
        expected: usize,
        /// The actual number of values in the row.
        got: usize,
        /// The zero-based index the row would have taken.
        row: usize,
    },

    /// Returned when a dataset's factor labels differ from the forest's.
    #[error("dataset factor labels do not match the forest's factor labels")]
    FactorLabelMismatch,

    /// Returned when a read or export operation runs on an untrained forest.
    #[error("random forest has not been trained")]
    NotTrained,

    /// Returned when a vector has a different number of values at classification time.
    #[error("classification input has {got} values, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of factors.
        expected: usize,
        /// The actual number of values in the input vector.
        got: usize,
    },

    /// Returned when OOB evaluation fails (no tree has any OOB row).
    #[error("OOB evaluation failed: {reason}")]
    OobEvaluationFailed {
        /// Human-readable description of why OOB evaluation failed.
        reason: String,
    },

    /// Returned when an imported model is structurally invalid.
    #[error("malformed model: {reason}")]
    MalformedModel {
        /// Human-readable description of the structural problem.
        reason: String,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model")]
    DeserializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the input.
        found: u32,
    },
}

impl RfError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        RfError::MalformedModel {
            reason: reason.into(),
        }
    }
}
