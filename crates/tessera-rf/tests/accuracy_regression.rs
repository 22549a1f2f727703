//! End-to-end regression tests for tessera-rf.
//!
//! These tests train forests on deterministic synthetic datasets and check
//! the properties every caller relies on: vote fractions, OOB error,
//! importance ranking, persistence, and the untrained-state contract.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use tessera_rf::{
    DataFrame, Element, LabelStrategy, RandomForest, RfError, TrainingConfig,
};

// ---------------------------------------------------------------------------
// Helper: deterministic synthetic classification dataset
// ---------------------------------------------------------------------------

/// Generate a 100-row, 4-factor, 2-class dataset.
///
/// Factors 0-1 are informative (`A` in [0, 1), `B` in [3, 4)).
/// Factors 2-3 are pure noise in [0, 1).
/// Rows alternate between classes.
fn make_two_class() -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let names = (0..4).map(|f| format!("f{f}")).collect();
    let mut data = DataFrame::new(names);
    for i in 0..100 {
        let (label, base) = if i % 2 == 0 { ("A", 0.0) } else { ("B", 3.0) };
        let row: Vec<f64> = (0..4)
            .map(|f| {
                let offset = if f < 2 { base } else { 0.0 };
                offset + rng.r#gen::<f64>()
            })
            .collect();
        data.push_row(row, label).unwrap();
    }
    data
}

/// Three classes along factor 0, one noise factor.
fn make_three_class() -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut data = DataFrame::new(vec!["signal".into(), "noise".into()]);
    for i in 0..90 {
        let (label, base) = match i % 3 {
            0 => ("red", 0.0),
            1 => ("green", 5.0),
            _ => ("blue", 10.0),
        };
        data.push_row(vec![base + rng.r#gen::<f64>(), rng.r#gen::<f64>()], label)
            .unwrap();
    }
    data
}

fn trained_two_class(n_trees: usize) -> (RandomForest, DataFrame) {
    let data = make_two_class();
    let config = TrainingConfig::new(n_trees, 2, LabelStrategy::Multiclass)
        .unwrap()
        .with_seed(42);
    let mut forest = RandomForest::new();
    forest.train(&data, &config).unwrap();
    (forest, data)
}

// ---------------------------------------------------------------------------
// Training and classification
// ---------------------------------------------------------------------------

#[test]
fn fifty_trees_favor_the_true_class() {
    let (forest, data) = trained_two_class(50);
    assert!(forest.is_trained());
    assert_eq!(forest.n_trees(), 50);

    let a_row = (0..data.n_rows())
        .find(|&r| data.class_label(r) == "A")
        .unwrap();
    let scores = forest.classify_vector(data.row(a_row)).unwrap();
    assert!(scores["A"] > 0.5, "scores = {scores:?}");
}

#[test]
fn binary_fifty_trees_node_size_five() {
    let data = make_two_class();
    let mut forest = RandomForest::new();
    forest.train_binary(&data, 50, 2, "A", 5, 1.0, false).unwrap();
    assert!(forest.is_trained());
    assert_eq!(forest.n_trees(), 50);
    assert_eq!(forest.node_size(), 5);
    assert_eq!(forest.class_labels(), &["A", "other"]);

    let a_row = (0..data.n_rows())
        .find(|&r| data.class_label(r) == "A")
        .unwrap();
    let scores = forest.classify_vector(data.row(a_row)).unwrap();
    assert!(scores["A"] > 0.5, "scores = {scores:?}");
}

#[test]
fn scores_always_sum_to_one() {
    let (forest, data) = trained_two_class(25);
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let mut vectors: Vec<Vec<f64>> = data.rows().to_vec();
    vectors.extend((0..20).map(|_| (0..4).map(|_| rng.gen_range(-1.0..5.0)).collect()));
    for scores in forest.classify_batch(&vectors).unwrap() {
        let total: f64 = scores.values().sum();
        assert!((total - 1.0).abs() < 1e-12, "total = {total}");
    }
}

#[test]
fn round_robin_three_class() {
    let data = make_three_class();
    let mut forest = RandomForest::new();
    forest
        .train_round_robin(&data, 30, 1, "red", "blue", 1, 1.0, false)
        .unwrap();
    assert_eq!(forest.class_labels(), &["red", "blue"]);
    assert_eq!(forest.predict_label(&[0.5, 0.5]).unwrap(), "red");
    assert_eq!(forest.predict_label(&[10.5, 0.5]).unwrap(), "blue");

    let report = forest.evaluate(&data).unwrap();
    assert_eq!(report.rows.len(), 60);
    assert!(report.balanced_accuracy() > 0.95);
}

#[test]
fn balanced_bootstrap_recovers_minority_class() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut data = DataFrame::new(vec!["x".into(), "y".into()]);
    for _ in 0..90 {
        data.push_row(vec![rng.gen_range(0.0..1.0), rng.r#gen::<f64>()], "common")
            .unwrap();
    }
    for _ in 0..10 {
        data.push_row(vec![rng.gen_range(2.0..3.0), rng.r#gen::<f64>()], "rare")
            .unwrap();
    }
    let mut forest = RandomForest::new();
    forest.train_binary(&data, 40, 1, "rare", 1, 1.0, true).unwrap();
    let report = forest.evaluate(&data).unwrap();
    let rare = report
        .confusion
        .class_metrics()
        .into_iter()
        .find(|m| m.class == "rare")
        .unwrap();
    assert!(rare.recall > 0.9, "rare recall = {}", rare.recall);
}

// ---------------------------------------------------------------------------
// OOB error and importance
// ---------------------------------------------------------------------------

/// OOB error with 100 trees on well-separated classes must stay below 0.1.
#[test]
fn oob_error_below_threshold() {
    let (forest, data) = trained_two_class(100);
    let estimate = forest.find_average_error(&data).unwrap();
    assert!(estimate.average < 0.1, "OOB error {} >= 0.1", estimate.average);
    assert!(estimate.n_trees_evaluated > 90);
}

#[test]
fn noise_factors_near_zero_importance() {
    let (forest, data) = trained_two_class(100);
    let importance = forest.factor_importance(&data).unwrap();
    assert_eq!(importance.len(), 4);

    let top_two: Vec<&str> = importance[..2].iter().map(|f| f.name.as_str()).collect();
    assert!(top_two.contains(&"f0") && top_two.contains(&"f1"), "{importance:?}");
    for noise in importance.iter().filter(|f| f.name == "f2" || f.name == "f3") {
        assert!(
            noise.importance.abs() < 0.05,
            "noise factor {} importance = {}",
            noise.name,
            noise.importance
        );
    }
    assert_eq!(
        importance.iter().map(|f| f.rank).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
}

#[test]
fn retraining_prunes_noise_factors() {
    let data = make_two_class();
    let config = TrainingConfig::new(40, 3, LabelStrategy::Multiclass)
        .unwrap()
        .with_retrain(0.5);
    let mut forest = RandomForest::new();
    forest.train(&data, &config).unwrap();
    assert_eq!(forest.retained_factors(), &[0, 1]);
    assert_eq!(forest.num_split_factors(), 2);
    assert!(forest.find_average_error(&data).unwrap().average < 0.1);
}

#[test]
fn proximity_groups_same_class_rows() {
    let (forest, data) = trained_two_class(30);
    let prox = forest.find_proximity(&data).unwrap();
    // Rows 0 and 2 are both A; row 1 is B.
    assert!(prox.get(0, 2) > prox.get(0, 1));
    assert_eq!(prox.get(5, 5), 1.0);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn byte_and_document_round_trips_preserve_scores() {
    let (forest, data) = trained_two_class(20);

    let mut bytes = Vec::new();
    forest.export_model_to(&mut bytes).unwrap();
    let mut from_bytes = RandomForest::new();
    from_bytes.import_model_from(bytes.as_slice()).unwrap();

    let mut doc = Element::new("models");
    forest.export_model(&mut doc).unwrap();
    let json = serde_json::to_string(&doc).unwrap();
    let doc: Element = serde_json::from_str(&json).unwrap();
    let mut from_doc = RandomForest::new();
    from_doc.import_model(&doc).unwrap();

    for row in data.rows() {
        let expected = forest.classify_vector(row).unwrap();
        assert_eq!(from_bytes.classify_vector(row).unwrap(), expected);
        assert_eq!(from_doc.classify_vector(row).unwrap(), expected);
    }
    assert_eq!(
        from_doc.find_average_error(&data).unwrap(),
        forest.find_average_error(&data).unwrap()
    );
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn cleared_forest_reports_not_trained() {
    let (mut forest, data) = trained_two_class(10);
    forest.clear();
    assert!(!forest.is_trained());
    assert!(matches!(
        forest.classify_vector(data.row(0)),
        Err(RfError::NotTrained)
    ));
    assert!(matches!(forest.find_average_error(&data), Err(RfError::NotTrained)));
    assert!(matches!(forest.find_proximity(&data), Err(RfError::NotTrained)));
    assert!(matches!(forest.factor_importance(&data), Err(RfError::NotTrained)));
    assert!(matches!(
        forest.export_model(&mut Element::new("root")),
        Err(RfError::NotTrained)
    ));
}

#[test]
fn imputed_dataset_trains() {
    let mut data = make_two_class();
    data.set_value(0, 0, f64::NAN);
    data.set_value(1, 3, f64::NAN);
    assert!(matches!(
        RandomForest::new().train_multiclass(&data, 5, 2, 1, 1.0, false),
        Err(RfError::MissingValue { row: 0, factor: 0 })
    ));

    assert_eq!(RandomForest::replace_missing_training_values(&mut data), 2);
    assert_eq!(RandomForest::replace_missing_training_values(&mut data), 0);
    // Row 0 is class A, so its fill sits in A's range.
    assert!(data.value(0, 0) < 1.0);

    let mut forest = RandomForest::new();
    forest.train_multiclass(&data, 5, 2, 1, 1.0, false).unwrap();
    assert_eq!(forest.n_trees(), 5);
}
