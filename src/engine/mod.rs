//! Inference engine.
//!
//! Every model family implements [`Predictor`]; the artifact stores one of them
//! as a [`ModelFamily`] variant selected by the `model.family` tag. Payloads are
//! validated against the artifact schema before any family code runs, and all
//! arithmetic is `f64` in schema order so repeated calls are bit-identical.

pub mod allocation;
pub mod linear;
pub mod schema;
pub mod trees;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::artifact::ModelArtifact;
use crate::error::{ArtifactError, ServeError, ServeResult, ValidationError};

pub use allocation::{ChannelCredit, TouchpointAllocation};
pub use linear::LinearModel;
pub use schema::{FeatureField, FeatureSchema, FeatureType, FeatureValue, FeatureVector};
pub use trees::TreeEnsemble;

/// Output transform applied to a raw score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    #[default]
    Identity,
    Logistic,
}

impl Link {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Identity => x,
            Self::Logistic => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

pub(crate) fn ensure_finite(value: f64, what: &str) -> Result<(), ArtifactError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ArtifactError::invalid(format!("{what} is not finite")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Prediction {
    Score {
        score: f64,
    },
    Attribution {
        total: f64,
        credits: Vec<ChannelCredit>,
    },
}

impl Prediction {
    fn is_finite(&self) -> bool {
        match self {
            Self::Score { score } => score.is_finite(),
            Self::Attribution { total, credits } => {
                total.is_finite() && credits.iter().all(|c| c.credit.is_finite())
            }
        }
    }
}

/// Capability shared by every model family: feature vector in, result out.
pub trait Predictor: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, String>;
}

/// Model family parameters as written in an artifact file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelSpec {
    Linear(linear::LinearSpec),
    TreeEnsemble(trees::TreeEnsembleSpec),
    TouchpointAllocation(allocation::AllocationSpec),
}

/// Compiled model family, bound to a schema.
#[derive(Debug, Clone)]
pub enum ModelFamily {
    Linear(LinearModel),
    TreeEnsemble(TreeEnsemble),
    TouchpointAllocation(TouchpointAllocation),
}

impl ModelFamily {
    pub fn compile(spec: ModelSpec, schema: &FeatureSchema) -> Result<Self, ArtifactError> {
        Ok(match spec {
            ModelSpec::Linear(s) => Self::Linear(LinearModel::compile(s, schema)?),
            ModelSpec::TreeEnsemble(s) => Self::TreeEnsemble(TreeEnsemble::compile(s, schema)?),
            ModelSpec::TouchpointAllocation(s) => {
                Self::TouchpointAllocation(TouchpointAllocation::compile(s, schema)?)
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear(_) => "linear",
            Self::TreeEnsemble(_) => "tree_ensemble",
            Self::TouchpointAllocation(_) => "touchpoint_allocation",
        }
    }
}

impl Predictor for ModelFamily {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, String> {
        match self {
            Self::Linear(m) => m.predict(features),
            Self::TreeEnsemble(m) => m.predict(features),
            Self::TouchpointAllocation(m) => m.predict(features),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Compute(String),
}

/// Validate `features` against `schema`, then run `predictor`.
pub fn run(
    schema: &FeatureSchema,
    predictor: &dyn Predictor,
    features: &Map<String, Value>,
) -> Result<Prediction, EngineError> {
    let vector = schema.validate(features)?;
    let prediction = predictor.predict(&vector).map_err(EngineError::Compute)?;
    if !prediction.is_finite() {
        return Err(EngineError::Compute("model produced a non-finite result".to_string()));
    }
    Ok(prediction)
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceResult {
    pub request_id: Uuid,
    pub model: String,
    pub version: String,
    pub prediction: Prediction,
    pub timestamp: DateTime<Utc>,
}

pub fn predict(artifact: &ModelArtifact, features: &Map<String, Value>) -> ServeResult<InferenceResult> {
    let prediction = run(&artifact.schema, &artifact.family, features).map_err(|e| match e {
        EngineError::Validation(v) => ServeError::Validation(v),
        EngineError::Compute(message) => ServeError::Inference {
            model: artifact.name.clone(),
            version: artifact.version.clone(),
            message,
        },
    })?;

    Ok(InferenceResult {
        request_id: Uuid::new_v4(),
        model: artifact.name.clone(),
        version: artifact.version.clone(),
        prediction,
        timestamp: Utc::now(),
    })
}
