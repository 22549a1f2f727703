use rand::Rng;
use tracing::trace;

use crate::{
    RfError,
    data_frame::DataFrame,
    node::{Node, NodeIndex},
    split::{CandidateFactors, SplitCriterion, find_best_split},
};

/// Stopping and search parameters shared by every node of one tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InductionParams<'a> {
    pub(crate) candidates: CandidateFactors<'a>,
    pub(crate) node_size: usize,
    pub(crate) criterion: SplitCriterion,
    pub(crate) n_classes: usize,
}

/// A decision tree grown on one bootstrap sample.
///
/// Stored as an arena-based `Vec<Node>` rooted at index 0. The tree also
/// remembers which rows of its training frame were drawn into the bootstrap
/// sample; every other row is out-of-bag for this tree.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RandomTree {
    pub(crate) nodes: Vec<Node>,
    /// Sorted, de-duplicated in-bag row indices.
    pub(crate) bag: Vec<usize>,
    pub(crate) n_factors: usize,
}

impl RandomTree {
    /// Grow a tree on the bootstrap `sample` (row indices into `frame`, repeats allowed).
    pub(crate) fn induce(
        frame: &DataFrame,
        classes: &[usize],
        sample: &[usize],
        params: &InductionParams<'_>,
        rng: &mut impl Rng,
    ) -> Self {
        let mut nodes = Vec::new();
        grow(frame, classes, sample, params, rng, &mut nodes);

        let mut bag = sample.to_vec();
        bag.sort_unstable();
        bag.dedup();

        trace!(n_nodes = nodes.len(), n_in_bag = bag.len(), "tree induced");

        Self {
            nodes,
            bag,
            n_factors: frame.n_factors(),
        }
    }

    /// Classify a vector, returning the index of the voted class.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `vector.len()` differs
    /// from the factor count the tree was grown on.
    pub fn classify(&self, vector: &[f64]) -> Result<usize, RfError> {
        self.check_len(vector)?;
        Ok(self.leaf_class(self.traverse(vector)))
    }

    /// Return the id of the leaf `vector` lands in.
    ///
    /// Two vectors share a partition of this tree iff their leaf ids are equal.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] on a length mismatch.
    pub fn leaf_id(&self, vector: &[f64]) -> Result<NodeIndex, RfError> {
        self.check_len(vector)?;
        Ok(NodeIndex::new(self.traverse(vector)))
    }

    /// Return the sorted in-bag row indices.
    #[must_use]
    pub fn bag(&self) -> &[usize] {
        &self.bag
    }

    /// Return the rows in `0..n_rows` that were not drawn for this tree.
    #[must_use]
    pub fn oob_rows(&self, n_rows: usize) -> Vec<usize> {
        let mut in_bag = self.bag.iter().peekable();
        (0..n_rows)
            .filter(|&r| {
                while in_bag.next_if(|&&b| b < r).is_some() {}
                in_bag.peek() != Some(&&r)
            })
            .collect()
    }

    /// Borrow the node arena.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return the total number of nodes in the tree (both splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree; a lone root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0usize;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, d)) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    stack.push((left.index(), d + 1));
                    stack.push((right.index(), d + 1));
                }
            }
        }
        max_depth
    }

    /// Check the arena before it is trusted for traversal.
    ///
    /// Children must point strictly forward and in range, leaves must name a
    /// known class, and splits a known factor.
    pub(crate) fn validate(&self, n_classes: usize, n_factors: usize) -> Result<(), RfError> {
        if self.nodes.is_empty() {
            return Err(RfError::malformed("tree has no nodes"));
        }
        if self.n_factors != n_factors {
            return Err(RfError::malformed(format!(
                "tree expects {} factors, forest has {n_factors}",
                self.n_factors
            )));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { class, .. } if *class >= n_classes => {
                    return Err(RfError::malformed(format!(
                        "node {i} votes for class {class}, forest has {n_classes}"
                    )));
                }
                Node::Split {
                    factor,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if factor.index() >= n_factors {
                        return Err(RfError::malformed(format!(
                            "node {i} splits on factor {factor}, forest has {n_factors}"
                        )));
                    }
                    if threshold.is_nan() {
                        return Err(RfError::malformed(format!("node {i} has a NaN threshold")));
                    }
                    for child in [left.index(), right.index()] {
                        if child <= i || child >= self.nodes.len() {
                            return Err(RfError::malformed(format!(
                                "node {i} has out-of-order child {child}"
                            )));
                        }
                    }
                }
                Node::Leaf { .. } => {}
            }
        }
        Ok(())
    }

    fn check_len(&self, vector: &[f64]) -> Result<(), RfError> {
        if vector.len() != self.n_factors {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_factors,
                got: vector.len(),
            });
        }
        Ok(())
    }

    fn leaf_class(&self, idx: usize) -> usize {
        match &self.nodes[idx] {
            Node::Leaf { class, .. } => *class,
            Node::Split { .. } => unreachable!("traverse always ends at a leaf"),
        }
    }

    /// Walk from the root to a leaf: `value <= threshold` goes left.
    pub(crate) fn traverse(&self, vector: &[f64]) -> usize {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { .. } => return idx,
                Node::Split {
                    factor,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if vector[factor.index()] <= *threshold {
                        left.index()
                    } else {
                        right.index()
                    };
                }
            }
        }
    }

    /// Class index voted for by this tree; `vector` must have `n_factors` values.
    pub(crate) fn leaf_class_of(&self, vector: &[f64]) -> usize {
        self.leaf_class(self.traverse(vector))
    }

    /// Class index voted for by this tree for row `row` of `frame`.
    pub(crate) fn classify_row(&self, frame: &DataFrame, row: usize) -> usize {
        self.leaf_class_of(frame.row(row))
    }
}

/// Recursively grow the subtree for `rows` and return its arena index.
fn grow(
    frame: &DataFrame,
    classes: &[usize],
    rows: &[usize],
    params: &InductionParams<'_>,
    rng: &mut impl Rng,
    arena: &mut Vec<Node>,
) -> NodeIndex {
    let n_rows = rows.len();
    let mut class_counts = vec![0usize; params.n_classes];
    for &r in rows {
        class_counts[classes[r]] += 1;
    }
    let impurity = params.criterion.impurity(&class_counts, n_rows);

    // Majority vote; ties go to the lowest class index.
    let majority = class_counts
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    let leaf = Node::Leaf {
        class: majority,
        impurity,
        n_rows,
    };

    if n_rows <= params.node_size || impurity.value() == 0.0 {
        arena.push(leaf);
        return NodeIndex::new(arena.len() - 1);
    }

    let Some(split) = find_best_split(
        frame,
        classes,
        rows,
        params.n_classes,
        params.criterion,
        params.candidates,
        rng,
    ) else {
        arena.push(leaf);
        return NodeIndex::new(arena.len() - 1);
    };

    trace!(
        factor = split.factor.index(),
        threshold = split.threshold,
        impurity_decrease = split.impurity_decrease,
        n_left = split.left_rows.len(),
        n_right = split.right_rows.len(),
        "node split"
    );

    // Reserve this node's slot so children land at higher indices.
    let node_idx = arena.len();
    arena.push(leaf);

    let left = grow(frame, classes, &split.left_rows, params, rng, arena);
    let right = grow(frame, classes, &split.right_rows, params, rng, arena);

    arena[node_idx] = Node::Split {
        factor: split.factor,
        threshold: split.threshold,
        left,
        right,
        impurity,
        n_rows,
    };

    NodeIndex::new(node_idx)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::node::{FactorIndex, Impurity};

    fn frame(rows: Vec<Vec<f64>>, labels: &[&str]) -> DataFrame {
        let names = (0..rows[0].len()).map(|i| format!("f{i}")).collect();
        DataFrame::from_rows(names, rows, labels.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    fn grow_all(data: &DataFrame, classes: &[usize], node_size: usize) -> RandomTree {
        let pool: Vec<usize> = (0..data.n_factors()).collect();
        let params = InductionParams {
            candidates: CandidateFactors {
                pool: &pool,
                per_split: pool.len(),
            },
            node_size,
            criterion: SplitCriterion::Gini,
            n_classes: classes.iter().max().map_or(1, |m| m + 1),
        };
        let sample: Vec<usize> = (0..data.n_rows()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        RandomTree::induce(data, classes, &sample, &params, &mut rng)
    }

    #[test]
    fn pure_sample_single_leaf() {
        let data = frame(vec![vec![1.0, 2.0], vec![3.0, 4.0]], &["a", "a"]);
        let tree = grow_all(&data, &[0, 0], 1);
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.classify(&[9.0, 9.0]).unwrap(), 0);
    }

    #[test]
    fn separable_data_classified() {
        let data = frame(
            vec![
                vec![1.0, 0.0],
                vec![2.0, 0.0],
                vec![3.0, 0.0],
                vec![10.0, 0.0],
                vec![11.0, 0.0],
                vec![12.0, 0.0],
            ],
            &["a", "a", "a", "b", "b", "b"],
        );
        let tree = grow_all(&data, &[0, 0, 0, 1, 1, 1], 1);
        assert_eq!(tree.classify(&[2.0, 0.0]).unwrap(), 0);
        assert_eq!(tree.classify(&[11.0, 0.0]).unwrap(), 1);
        assert_ne!(
            tree.leaf_id(&[2.0, 0.0]).unwrap(),
            tree.leaf_id(&[11.0, 0.0]).unwrap()
        );
    }

    #[test]
    fn adjacent_float_values_terminate() {
        let lo = f64::from_bits(1.0_f64.to_bits() + 1);
        let hi = f64::from_bits(1.0_f64.to_bits() + 2);
        let data = frame(vec![vec![lo], vec![hi]], &["a", "b"]);
        let tree = grow_all(&data, &[0, 1], 1);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.classify(&[lo]).unwrap(), 0);
        assert_eq!(tree.classify(&[hi]).unwrap(), 1);
    }

    #[test]
    fn interleaved_classes_need_depth_two() {
        let data = frame(
            vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]],
            &["a", "b", "b", "a"],
        );
        let tree = grow_all(&data, &[0, 1, 1, 0], 1);
        assert!(tree.depth() >= 2);
        assert_eq!(tree.n_leaves(), 3);
        for (x, class) in [(1.0, 0), (2.0, 1), (3.0, 1), (4.0, 0)] {
            assert_eq!(tree.classify(&[x]).unwrap(), class);
        }
    }

    #[test]
    fn node_size_stops_splitting() {
        let data = frame(
            vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]],
            &["a", "b", "a", "b"],
        );
        let tree = grow_all(&data, &[0, 1, 0, 1], 4);
        assert_eq!(tree.n_nodes(), 1);
        // 2-2 tie resolves to the lowest class index.
        assert_eq!(tree.classify(&[1.0]).unwrap(), 0);
    }

    #[test]
    fn oob_rows_complement_the_bag() {
        let tree = RandomTree {
            nodes: vec![Node::Leaf {
                class: 0,
                impurity: Impurity::new(0.0),
                n_rows: 3,
            }],
            bag: vec![1, 3, 4],
            n_factors: 1,
        };
        assert_eq!(tree.oob_rows(7), vec![0, 2, 5, 6]);
        assert_eq!(tree.oob_rows(0), Vec::<usize>::new());
    }

    #[test]
    fn bag_is_sorted_and_unique() {
        let data = frame(vec![vec![1.0], vec![2.0], vec![3.0]], &["a", "b", "a"]);
        let pool = [0usize];
        let params = InductionParams {
            candidates: CandidateFactors {
                pool: &pool,
                per_split: 1,
            },
            node_size: 1,
            criterion: SplitCriterion::Gini,
            n_classes: 2,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let tree = RandomTree::induce(&data, &[0, 1, 0], &[2, 0, 2, 2], &params, &mut rng);
        assert_eq!(tree.bag(), &[0, 2]);
        assert_eq!(tree.oob_rows(3), vec![1]);
    }

    #[test]
    fn classify_length_mismatch() {
        let data = frame(vec![vec![1.0, 2.0], vec![3.0, 4.0]], &["a", "b"]);
        let tree = grow_all(&data, &[0, 1], 1);
        assert!(matches!(
            tree.classify(&[1.0]),
            Err(RfError::PredictionFeatureMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn validate_rejects_backward_child() {
        let tree = RandomTree {
            nodes: vec![
                Node::Split {
                    factor: FactorIndex::new(0),
                    threshold: 1.0,
                    left: NodeIndex::new(0),
                    right: NodeIndex::new(1),
                    impurity: Impurity::new(0.5),
                    n_rows: 2,
                },
                Node::Leaf {
                    class: 0,
                    impurity: Impurity::new(0.0),
                    n_rows: 1,
                },
            ],
            bag: vec![],
            n_factors: 1,
        };
        assert!(matches!(
            tree.validate(2, 1),
            Err(RfError::MalformedModel { .. })
        ));
    }
}
