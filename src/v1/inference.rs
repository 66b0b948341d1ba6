use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::artifact::ModelArtifact;
use crate::engine::{self, InferenceResult, Prediction};
use crate::error::{ServeError, ServeResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct InferenceRequest {
    pub model: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub features: Map<String, Value>,
}

#[derive(Serialize)]
pub struct RiskScoreResponse {
    pub risk_score: f64,
    pub model: String,
    pub version: String,
}

/// Run one prediction on a blocking worker, bounded by the configured timeout.
///
/// The timeout covers waiting for a slot as well. If the caller goes away the
/// worker still finishes, holding nothing but its own `Arc`s.
pub async fn run_inference(
    state: &AppState,
    artifact: Arc<ModelArtifact>,
    features: Map<String, Value>,
) -> ServeResult<InferenceResult> {
    let slots = state.inference_slots.clone();
    let work = async move {
        let permit = slots
            .acquire_owned()
            .await
            .map_err(|_| ServeError::Unavailable("inference worker pool is shut down".to_string()))?;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            engine::predict(&artifact, &features)
        })
        .await
        .map_err(|e| ServeError::Internal(format!("inference worker failed: {e}")))?
    };

    tokio::time::timeout(state.config.inference_timeout(), work)
        .await
        .map_err(|_| ServeError::Timeout(state.config.inference_timeout_ms))?
}

pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<InferenceRequest>, JsonRejection>,
) -> ServeResult<Json<InferenceResult>> {
    let Json(req) = payload.map_err(|e| ServeError::BadRequest(e.body_text()))?;
    if req.model.trim().is_empty() {
        return Err(ServeError::BadRequest("model must not be empty".to_string()));
    }
    state.ensure_serving()?;

    let artifact = state
        .registry
        .snapshot()
        .resolve(&req.model, req.version.as_deref())?;

    let result = run_inference(&state, artifact, req.features).await?;
    tracing::debug!(
        request_id = %result.request_id,
        model = %result.model,
        version = %result.version,
        "prediction served"
    );
    Ok(Json(result))
}

/// `GET /risk/score?avg_speed_mph=..&trips_per_hour=..` against the active risk model.
pub async fn risk_score(
    State(state): State<AppState>,
    params: Result<Query<BTreeMap<String, String>>, QueryRejection>,
) -> ServeResult<Json<RiskScoreResponse>> {
    let Query(mut params) = params.map_err(|e| ServeError::BadRequest(e.body_text()))?;
    state.ensure_serving()?;

    let name = &state.config.risk_model;
    let artifact = match state.registry.snapshot().resolve(name, None) {
        Ok(artifact) => artifact,
        Err(ServeError::NotFound(_)) => {
            return Err(ServeError::Unavailable(format!("risk model '{name}' not available")));
        }
        Err(e) => return Err(e),
    };

    // Keys outside the schema are ignored.
    params.retain(|key, _| artifact.schema.lookup(key).is_some());
    let features = artifact.schema.parse_text(&params)?;
    let result = run_inference(&state, artifact, features).await?;
    match result.prediction {
        Prediction::Score { score } => Ok(Json(RiskScoreResponse {
            risk_score: score,
            model: result.model,
            version: result.version,
        })),
        Prediction::Attribution { .. } => Err(ServeError::Inference {
            model: result.model,
            version: result.version,
            message: "risk model does not produce a score".to_string(),
        }),
    }
}
