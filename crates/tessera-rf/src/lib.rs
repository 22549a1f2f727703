//! Random Forest ensembles: train, classify, evaluate, persist.
//!
//! Grows CART-style decision trees on bootstrap samples in parallel via
//! rayon and classifies by majority vote. Beyond prediction, a trained
//! [`RandomForest`] estimates its generalization error from out-of-bag rows,
//! ranks factors by permutation importance, and measures row proximity from
//! shared leaves. Models export to a structured document or a byte stream.

mod config;
mod confusion;
mod data_frame;
mod document;
mod error;
mod forest;
mod importance;
mod impute;
mod node;
mod oob;
mod predict;
mod proximity;
mod serialize;
mod split;
mod strategy;
mod tree;

pub use config::TrainingConfig;
pub use confusion::{ClassMetrics, ConfusionMatrix, EvaluationReport, RowScores};
pub use data_frame::DataFrame;
pub use document::{DocumentElement, Element};
pub use error::RfError;
pub use forest::RandomForest;
pub use importance::FactorImportance;
pub use node::{FactorIndex, Impurity, Node, NodeIndex};
pub use oob::ErrorEstimate;
pub use proximity::ProximityMatrix;
pub use split::SplitCriterion;
pub use strategy::{LabelStrategy, NEGATIVE_CLASS_LABEL};
pub use tree::RandomTree;
