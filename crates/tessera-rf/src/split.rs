use rand::Rng;

use crate::data_frame::DataFrame;
use crate::node::{FactorIndex, Impurity};

/// Smallest weighted impurity decrease that counts as an improvement.
const MIN_DECREASE: f64 = 1e-12;

/// Criterion for measuring class purity at a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitCriterion {
    /// Gini impurity: 1 - Σ(p_i²)
    #[default]
    Gini,
    /// Information entropy: -Σ(p_i · ln(p_i))
    Entropy,
}

impl SplitCriterion {
    /// Compute the impurity of a node from its class counts.
    ///
    /// An empty node is pure.
    #[must_use]
    pub fn impurity(&self, class_counts: &[usize], n_rows: usize) -> Impurity {
        if n_rows == 0 {
            return Impurity::new(0.0);
        }
        let n = n_rows as f64;
        let value = match self {
            SplitCriterion::Gini => {
                1.0 - class_counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p
                    })
                    .sum::<f64>()
            }
            SplitCriterion::Entropy => -class_counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
        };
        Impurity::new(value)
    }
}

/// The chosen split for a node, with the rows routed to each child.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    pub(crate) factor: FactorIndex,
    pub(crate) threshold: f64,
    /// `n·I(parent) - n_l·I(left) - n_r·I(right)`.
    pub(crate) impurity_decrease: f64,
    pub(crate) left_rows: Vec<usize>,
    pub(crate) right_rows: Vec<usize>,
}

/// Where a node's split search draws candidates from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CandidateFactors<'a> {
    /// Factors the tree may split on.
    pub(crate) pool: &'a [usize],
    /// How many of them to try at each node.
    pub(crate) per_split: usize,
}

/// Find the best split of `rows` among a random subset of candidate factors.
///
/// `rows` index into `frame` and may repeat (bootstrap draws). For each
/// sampled factor the `(value, class)` pairs are sorted and scanned once with
/// incremental class counts; thresholds sit midway between consecutive
/// distinct values.
///
/// Returns `None` when no candidate split lowers the weighted impurity.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_best_split(
    frame: &DataFrame,
    classes: &[usize],
    rows: &[usize],
    n_classes: usize,
    criterion: SplitCriterion,
    candidates: CandidateFactors<'_>,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_rows = rows.len();
    if n_rows < 2 || candidates.pool.is_empty() {
        return None;
    }

    let mut parent_counts = vec![0usize; n_classes];
    for &r in rows {
        parent_counts[classes[r]] += 1;
    }
    let parent = criterion.impurity(&parent_counts, n_rows).value() * n_rows as f64;

    // Partial Fisher-Yates over the pool picks `take` distinct factors.
    let mut order: Vec<usize> = candidates.pool.to_vec();
    let take = candidates.per_split.min(order.len());
    for i in 0..take {
        let j = rng.gen_range(i..order.len());
        order.swap(i, j);
    }

    let mut best_decrease = MIN_DECREASE;
    let mut best: Option<(usize, f64)> = None;
    let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(n_rows);

    for &factor in &order[..take] {
        sorted.clear();
        sorted.extend(rows.iter().map(|&r| (frame.value(r, factor), classes[r])));
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_counts = vec![0usize; n_classes];
        let mut right_counts = parent_counts.clone();

        for i in 0..n_rows - 1 {
            let (value, class) = sorted[i];
            left_counts[class] += 1;
            right_counts[class] -= 1;

            let next = sorted[i + 1].0;
            if value == next {
                continue;
            }

            let n_left = i + 1;
            let n_right = n_rows - n_left;
            let decrease = parent
                - n_left as f64 * criterion.impurity(&left_counts, n_left).value()
                - n_right as f64 * criterion.impurity(&right_counts, n_right).value();

            if decrease > best_decrease {
                best_decrease = decrease;
                // Between adjacent floats the midpoint can round up to `next`.
                let mid = value + (next - value) / 2.0;
                best = Some((factor, if mid < next { mid } else { value }));
            }
        }
    }

    let (factor, threshold) = best?;
    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .partition(|&&r| frame.value(r, factor) <= threshold);
    if left_rows.is_empty() || right_rows.is_empty() {
        return None;
    }

    Some(SplitResult {
        factor: FactorIndex::new(factor),
        threshold,
        impurity_decrease: best_decrease,
        left_rows,
        right_rows,
    })
}
