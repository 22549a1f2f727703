//! Model export and import: a structured document form and a bincode byte form.

use std::io::{Read, Write};
use std::str::FromStr;

use tracing::{debug, info, instrument};

use crate::document::DocumentElement;
use crate::error::RfError;
use crate::forest::RandomForest;
use crate::node::{FactorIndex, Impurity, Node, NodeIndex};
use crate::strategy::LabelStrategy;
use crate::tree::RandomTree;

/// Current format version of both export forms.
const FORMAT_VERSION: u32 = 1;

const FOREST: &str = "RandomForest";
const TREE: &str = "RandomTree";
const NODE: &str = "Node";
const CLASS_LABEL: &str = "ClassLabel";
const FACTOR_LABEL: &str = "FactorLabel";

/// Byte-form payload, written after the format version.
#[derive(serde::Serialize, serde::Deserialize)]
struct ModelEnvelope {
    /// Number of trees, checked against the decoded forest.
    n_trees: usize,
    /// The serialized forest.
    forest: RandomForest,
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn required<'a, E: DocumentElement>(el: &'a E, key: &str) -> Result<&'a str, RfError> {
    el.attribute(key)
        .ok_or_else(|| RfError::malformed(format!("<{}> is missing attribute {key}", el.name())))
}

fn parse<T: FromStr, E: DocumentElement>(el: &E, key: &str) -> Result<T, RfError> {
    let raw = required(el, key)?;
    raw.parse().map_err(|_| {
        RfError::malformed(format!("<{}> attribute {key}=\"{raw}\" is not valid", el.name()))
    })
}

fn parse_list<E: DocumentElement>(el: &E, key: &str) -> Result<Vec<usize>, RfError> {
    required(el, key)?
        .split_whitespace()
        .map(|v| {
            v.parse()
                .map_err(|_| RfError::malformed(format!("<{}> {key} holds \"{v}\"", el.name())))
        })
        .collect()
}

fn write_strategy<E: DocumentElement>(el: &mut E, strategy: &LabelStrategy) {
    match strategy {
        LabelStrategy::OneVsRest { positive } => {
            el.set_attribute("strategy", "binary".to_string());
            el.set_attribute("positiveClass", positive.clone());
        }
        LabelStrategy::Multiclass => el.set_attribute("strategy", "multiclass".to_string()),
        LabelStrategy::OneVsOne { positive, negative } => {
            el.set_attribute("strategy", "roundrobin".to_string());
            el.set_attribute("positiveClass", positive.clone());
            el.set_attribute("negativeClass", negative.clone());
        }
    }
}

fn read_strategy<E: DocumentElement>(el: &E) -> Result<LabelStrategy, RfError> {
    match required(el, "strategy")? {
        "binary" => Ok(LabelStrategy::OneVsRest {
            positive: required(el, "positiveClass")?.to_string(),
        }),
        "multiclass" => Ok(LabelStrategy::Multiclass),
        "roundrobin" => Ok(LabelStrategy::OneVsOne {
            positive: required(el, "positiveClass")?.to_string(),
            negative: required(el, "negativeClass")?.to_string(),
        }),
        other => Err(RfError::malformed(format!("unknown strategy \"{other}\""))),
    }
}

fn write_node<E: DocumentElement>(el: &mut E, id: usize, node: &Node) {
    el.set_attribute("id", id.to_string());
    el.set_attribute("impurity", node.impurity().value().to_string());
    el.set_attribute("nRows", node.n_rows().to_string());
    match node {
        Node::Split {
            factor,
            threshold,
            left,
            right,
            ..
        } => {
            el.set_attribute("factor", factor.index().to_string());
            // `Display` for f64 is the shortest string that parses back exactly.
            el.set_attribute("threshold", threshold.to_string());
            el.set_attribute("left", left.index().to_string());
            el.set_attribute("right", right.index().to_string());
        }
        Node::Leaf { class, .. } => {
            el.set_attribute("class", class.to_string());
        }
    }
}

fn read_node<E: DocumentElement>(el: &E, expected_id: usize) -> Result<Node, RfError> {
    let id: usize = parse(el, "id")?;
    if id != expected_id {
        return Err(RfError::malformed(format!(
            "node id {id} found where {expected_id} was expected"
        )));
    }
    let impurity = Impurity::new(parse(el, "impurity")?);
    let n_rows = parse(el, "nRows")?;
    if el.attribute("class").is_some() {
        Ok(Node::Leaf {
            class: parse(el, "class")?,
            impurity,
            n_rows,
        })
    } else {
        Ok(Node::Split {
            factor: FactorIndex::new(parse(el, "factor")?),
            threshold: parse(el, "threshold")?,
            left: NodeIndex::new(parse(el, "left")?),
            right: NodeIndex::new(parse(el, "right")?),
            impurity,
            n_rows,
        })
    }
}

fn read_tree<E: DocumentElement>(el: &E) -> Result<RandomTree, RfError> {
    let nodes = el
        .children()
        .iter()
        .filter(|c| c.name() == NODE)
        .enumerate()
        .map(|(i, c)| read_node(c, i))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RandomTree {
        nodes,
        bag: parse_list(el, "bag")?,
        n_factors: parse(el, "nFactors")?,
    })
}

fn read_labels<E: DocumentElement>(el: &E, child: &str) -> Result<Vec<String>, RfError> {
    el.children()
        .iter()
        .filter(|c| c.name() == child)
        .map(|c| required(c, "name").map(str::to_string))
        .collect()
}

fn find_forest<E: DocumentElement>(element: &E) -> Result<&E, RfError> {
    if element.name() == FOREST {
        return Ok(element);
    }
    element
        .children()
        .iter()
        .find(|c| c.name() == FOREST)
        .ok_or_else(|| {
            RfError::malformed(format!("no <{FOREST}> element under <{}>", element.name()))
        })
}

impl RandomForest {
    /// Check a decoded forest before it replaces the current state.
    fn validate_model(&self) -> Result<(), RfError> {
        if self.trees.is_empty() {
            return Err(RfError::malformed("model holds no trees"));
        }
        if self.class_labels.is_empty() {
            return Err(RfError::malformed("model holds no class labels"));
        }
        let n_factors = self.factor_labels.len();
        if let Some(&f) = self.retained_factors.iter().find(|&&f| f >= n_factors) {
            return Err(RfError::malformed(format!(
                "retained factor {f} out of range for {n_factors} factors"
            )));
        }
        if self.strategy.is_none() {
            return Err(RfError::malformed("model has no label strategy"));
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(self.class_labels.len(), n_factors)
                .map_err(|e| match e {
                    RfError::MalformedModel { reason } => {
                        RfError::malformed(format!("tree {t}: {reason}"))
                    }
                    other => other,
                })?;
        }
        Ok(())
    }

    /// Append a `RandomForest` element describing this forest to `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::NotTrained`] for an untrained forest.
    #[instrument(skip_all, fields(n_trees = self.trees.len()))]
    pub fn export_model<E: DocumentElement>(&self, parent: &mut E) -> Result<(), RfError> {
        self.require_trained()?;
        let strategy = self.strategy.as_ref().ok_or(RfError::NotTrained)?;

        let el = parent.append_child(FOREST);
        el.set_attribute("formatVersion", FORMAT_VERSION.to_string());
        el.set_attribute("nodeSize", self.node_size.to_string());
        el.set_attribute("numSplitFactors", self.num_split_factors.to_string());
        el.set_attribute("seed", self.seed.to_string());
        el.set_attribute("retainedFactors", join(&self.retained_factors));
        write_strategy(el, strategy);

        for label in &self.class_labels {
            el.append_child(CLASS_LABEL).set_attribute("name", label.clone());
        }
        for label in &self.factor_labels {
            el.append_child(FACTOR_LABEL).set_attribute("name", label.clone());
        }
        for tree in &self.trees {
            let tree_el = el.append_child(TREE);
            tree_el.set_attribute("nFactors", tree.n_factors.to_string());
            tree_el.set_attribute("bag", join(&tree.bag));
            for (id, node) in tree.nodes.iter().enumerate() {
                write_node(tree_el.append_child(NODE), id, node);
            }
        }

        info!(n_trees = self.trees.len(), "model exported to document");
        Ok(())
    }

    /// Replace this forest with one read from a document.
    ///
    /// `element` may be the `RandomForest` element itself or a parent holding
    /// one. On any error the forest is left unchanged.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::MalformedModel`] | missing, unparseable or inconsistent content |
    /// | [`RfError::IncompatibleModelVersion`] | `formatVersion` differs from this build's |
    #[instrument(skip_all, fields(element = element.name()))]
    pub fn import_model<E: DocumentElement>(&mut self, element: &E) -> Result<(), RfError> {
        let el = find_forest(element)?;
        let version: u32 = parse(el, "formatVersion")?;
        if version != FORMAT_VERSION {
            return Err(RfError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: version,
            });
        }

        let trees = el
            .children()
            .iter()
            .filter(|c| c.name() == TREE)
            .map(read_tree)
            .collect::<Result<Vec<_>, _>>()?;

        let forest = RandomForest {
            trees,
            factor_labels: read_labels(el, FACTOR_LABEL)?,
            class_labels: read_labels(el, CLASS_LABEL)?,
            num_split_factors: parse(el, "numSplitFactors")?,
            node_size: parse(el, "nodeSize")?,
            strategy: Some(read_strategy(el)?),
            retained_factors: parse_list(el, "retainedFactors")?,
            seed: parse(el, "seed")?,
        };
        forest.validate_model()?;

        debug!(n_trees = forest.trees.len(), "model imported from document");
        *self = forest;
        Ok(())
    }

    /// Write the forest to a byte stream.
    ///
    /// The stream holds the format version followed by a bincode envelope.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::NotTrained`] | the forest is untrained |
    /// | [`RfError::SerializeModel`] | encoding or writing failed |
    #[instrument(skip_all, fields(n_trees = self.trees.len()))]
    pub fn export_model_to<W: Write>(&self, mut writer: W) -> Result<(), RfError> {
        self.require_trained()?;

        let envelope = ModelEnvelope {
            n_trees: self.trees.len(),
            forest: self.clone(),
        };
        bincode::serialize_into(&mut writer, &FORMAT_VERSION)
            .and_then(|()| bincode::serialize_into(&mut writer, &envelope))
            .map_err(|e| RfError::SerializeModel { source: e })?;

        info!(n_trees = self.trees.len(), "model exported to stream");
        Ok(())
    }

    /// Replace this forest with one read from a byte stream written by
    /// [`export_model_to`](Self::export_model_to). On any error the forest
    /// is left unchanged.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::DeserializeModel`] | reading or decoding failed |
    /// | [`RfError::IncompatibleModelVersion`] | the stream has another format version |
    /// | [`RfError::MalformedModel`] | the decoded forest is structurally inconsistent |
    #[instrument(skip_all)]
    pub fn import_model_from<R: Read>(&mut self, mut reader: R) -> Result<(), RfError> {
        let version: u32 = bincode::deserialize_from(&mut reader)
            .map_err(|e| RfError::DeserializeModel { source: e })?;
        if version != FORMAT_VERSION {
            return Err(RfError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: version,
            });
        }

        let envelope: ModelEnvelope = bincode::deserialize_from(&mut reader)
            .map_err(|e| RfError::DeserializeModel { source: e })?;
        if envelope.n_trees != envelope.forest.trees.len() {
            return Err(RfError::malformed(format!(
                "envelope declares {} trees, found {}",
                envelope.n_trees,
                envelope.forest.trees.len()
            )));
        }
        envelope.forest.validate_model()?;

        debug!(n_trees = envelope.n_trees, "model imported from stream");
        *self = envelope.forest;
        Ok(())
    }
}
