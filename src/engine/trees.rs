use serde::Deserialize;

use super::schema::{FeatureSchema, FeatureVector};
use super::{ensure_finite, Link, Prediction, Predictor};
use crate::error::ArtifactError;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    Leaf {
        leaf: f64,
    },
    Split {
        feature: String,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        default_left: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeEnsembleSpec {
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Vec<NodeSpec>>,
    #[serde(default)]
    pub link: Link,
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        default_left: bool,
    },
}

/// Additive ensemble of regression trees, e.g. an exported gradient boosted regressor.
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    base_score: f64,
    trees: Vec<Vec<Node>>,
    link: Link,
}

impl TreeEnsemble {
    pub fn compile(spec: TreeEnsembleSpec, schema: &FeatureSchema) -> Result<Self, ArtifactError> {
        ensure_finite(spec.base_score, "base_score")?;
        if spec.trees.is_empty() {
            return Err(ArtifactError::invalid("tree ensemble has no trees"));
        }

        let mut trees = Vec::with_capacity(spec.trees.len());
        for (t, nodes) in spec.trees.into_iter().enumerate() {
            if nodes.is_empty() {
                return Err(ArtifactError::invalid(format!("tree {t} is empty")));
            }
            let len = nodes.len();
            let mut compiled = Vec::with_capacity(len);
            for (i, node) in nodes.into_iter().enumerate() {
                compiled.push(match node {
                    NodeSpec::Leaf { leaf } => {
                        ensure_finite(leaf, &format!("tree {t} node {i} leaf"))?;
                        Node::Leaf(leaf)
                    }
                    NodeSpec::Split {
                        feature,
                        threshold,
                        left,
                        right,
                        default_left,
                    } => {
                        ensure_finite(threshold, &format!("tree {t} node {i} threshold"))?;
                        // Children must point forward so traversal always terminates.
                        for child in [left, right] {
                            if child <= i || child >= len {
                                return Err(ArtifactError::invalid(format!(
                                    "tree {t} node {i} has invalid child index {child}"
                                )));
                            }
                        }
                        Node::Split {
                            feature: schema.require(&feature, true, "tree split")?,
                            threshold,
                            left,
                            right,
                            default_left,
                        }
                    }
                });
            }
            trees.push(compiled);
        }

        Ok(Self {
            base_score: spec.base_score,
            trees,
            link: spec.link,
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn walk(tree: &[Node], features: &FeatureVector) -> f64 {
        let mut at = 0;
        loop {
            match tree[at] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    at = match features.number(feature) {
                        Some(x) if x < threshold => left,
                        Some(_) => right,
                        None if default_left => left,
                        None => right,
                    };
                }
            }
        }
    }
}

impl Predictor for TreeEnsemble {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, String> {
        let raw = self
            .trees
            .iter()
            .fold(self.base_score, |acc, tree| acc + Self::walk(tree, features));
        Ok(Prediction::Score {
            score: self.link.apply(raw),
        })
    }
}
