use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::artifact::LoadFailure;
use crate::error::{ServeError, ServeResult};
use crate::registry::ModelSummary;
use crate::AppState;

#[derive(Serialize)]
pub struct ModelListResponse {
    pub generation: u64,
    pub published_at: Option<DateTime<Utc>>,
    pub models: Vec<ModelSummary>,
}

#[derive(Debug, Serialize)]
pub struct FailureEntry {
    pub file: String,
    pub error: String,
}

impl From<&LoadFailure> for FailureEntry {
    fn from(f: &LoadFailure) -> Self {
        Self {
            file: f.file.display().to_string(),
            error: f.error.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub generation: u64,
    pub loaded: usize,
    pub failures: Vec<FailureEntry>,
    pub skipped: Vec<String>,
    pub dataset_failures: Vec<FailureEntry>,
}

pub async fn list_models(State(state): State<AppState>) -> ServeResult<impl IntoResponse> {
    state.ensure_serving()?;
    let snapshot = state.registry.snapshot();

    Ok((
        StatusCode::OK,
        Json(ModelListResponse {
            generation: snapshot.generation(),
            published_at: snapshot.published_at(),
            models: snapshot.list_models(),
        }),
    ))
}

/// Re-read the artifact directory and publish it if at least one artifact loads.
pub async fn reload_models(State(state): State<AppState>) -> ServeResult<Json<ReloadResponse>> {
    state.ensure_serving()?;

    let reader = state.reader.clone();
    let load = tokio::task::spawn_blocking(move || reader.load())
        .await
        .map_err(|e| ServeError::Internal(format!("reload worker failed: {e}")))?
        .map_err(|e| ServeError::ReloadFailed(e.to_string()))?;

    if load.artifacts.is_empty() {
        warn!(rejected = load.failures.len(), "reload found no loadable artifacts, keeping current models");
        return Err(ServeError::ReloadFailed(format!(
            "no loadable artifacts ({} rejected)",
            load.failures.len()
        )));
    }

    let loaded = load.artifacts.len();
    let failures = load.failures.iter().map(FailureEntry::from).collect();
    let dataset_failures = load.dataset_failures.iter().map(FailureEntry::from).collect();
    let skipped = load.skipped.iter().map(|p| p.display().to_string()).collect();

    let snapshot = state.registry.publish_load(load);
    info!(generation = snapshot.generation(), loaded, "artifacts reloaded");

    Ok(Json(ReloadResponse {
        generation: snapshot.generation(),
        loaded,
        failures,
        skipped,
        dataset_failures,
    }))
}
