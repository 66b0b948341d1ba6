use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use super::schema::{FeatureSchema, FeatureVector};
use super::{ensure_finite, Link, Prediction, Predictor};
use crate::error::ArtifactError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearSpec {
    #[serde(default)]
    pub intercept: f64,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    /// String field -> category value -> weight.
    #[serde(default)]
    pub categorical: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default)]
    pub link: Link,
}

/// Weighted sum over numeric and one-hot categorical features.
#[derive(Debug, Clone)]
pub struct LinearModel {
    intercept: f64,
    terms: Vec<(usize, f64)>,
    categorical: Vec<(usize, HashMap<String, f64>)>,
    link: Link,
}

impl LinearModel {
    pub fn compile(spec: LinearSpec, schema: &FeatureSchema) -> Result<Self, ArtifactError> {
        ensure_finite(spec.intercept, "intercept")?;
        if spec.weights.is_empty() && spec.categorical.is_empty() {
            return Err(ArtifactError::invalid("linear model has no weights"));
        }

        let mut terms = Vec::with_capacity(spec.weights.len());
        for (name, weight) in &spec.weights {
            ensure_finite(*weight, &format!("weight for '{name}'"))?;
            terms.push((schema.require(name, true, "weight")?, *weight));
        }
        terms.sort_by_key(|(idx, _)| *idx);

        let mut categorical = Vec::with_capacity(spec.categorical.len());
        for (name, table) in spec.categorical {
            for (value, weight) in &table {
                ensure_finite(*weight, &format!("weight for '{name}={value}'"))?;
            }
            let idx = schema.require(&name, false, "categorical weight")?;
            categorical.push((idx, table.into_iter().collect()));
        }
        categorical.sort_by_key(|(idx, _)| *idx);

        Ok(Self {
            intercept: spec.intercept,
            terms,
            categorical,
            link: spec.link,
        })
    }
}

impl Predictor for LinearModel {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, String> {
        let mut sum = self.intercept;
        for (idx, weight) in &self.terms {
            if let Some(x) = features.number(*idx) {
                sum += weight * x;
            }
        }
        for (idx, table) in &self.categorical {
            let hit = features
                .get(*idx)
                .and_then(|v| v.as_text())
                .and_then(|v| table.get(v));
            if let Some(weight) = hit {
                sum += weight;
            }
        }
        Ok(Prediction::Score {
            score: self.link.apply(sum),
        })
    }
}
