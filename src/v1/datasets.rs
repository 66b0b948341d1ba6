//! Read-only routes over the reference datasets of the current snapshot.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ServeError, ServeResult};
use crate::AppState;

pub const DEFAULT_TOP_LIMIT: i64 = 100;
pub const MAX_TOP_LIMIT: i64 = 200;

#[derive(Serialize)]
pub struct RouteListResponse {
    pub routes: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub limit: Option<i64>,
}

pub async fn list_routes(State(state): State<AppState>) -> ServeResult<Json<RouteListResponse>> {
    state.ensure_serving()?;
    let snapshot = state.registry.snapshot();
    let mut routes: Vec<String> = snapshot
        .datasets()
        .forecasts
        .as_ref()
        .map(|f| f.keys().cloned().collect())
        .unwrap_or_default();
    routes.sort();

    Ok(Json(RouteListResponse {
        count: routes.len(),
        routes,
    }))
}

pub async fn route_forecast(
    State(state): State<AppState>,
    Path(route_id): Path<String>,
) -> ServeResult<Json<Value>> {
    state.ensure_serving()?;
    let snapshot = state.registry.snapshot();
    let forecasts = snapshot
        .datasets()
        .forecasts
        .as_ref()
        .ok_or_else(|| ServeError::Unavailable("forecasts.json not available".to_string()))?;
    let forecast = forecasts
        .get(&route_id)
        .ok_or_else(|| ServeError::DatasetMissing(format!("no forecast for {route_id}")))?;
    Ok(Json(forecast.clone()))
}

pub async fn risk_top(
    State(state): State<AppState>,
    query: Result<Query<TopQuery>, QueryRejection>,
) -> ServeResult<Json<Vec<Value>>> {
    let Query(query) = query.map_err(|e| ServeError::BadRequest(e.body_text()))?;
    state.ensure_serving()?;
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT).clamp(1, MAX_TOP_LIMIT) as usize;

    let snapshot = state.registry.snapshot();
    let rows = snapshot
        .datasets()
        .top_candidates
        .as_ref()
        .ok_or_else(|| ServeError::DatasetMissing("no precomputed candidates".to_string()))?;
    Ok(Json(rows.iter().take(limit).cloned().collect()))
}

pub async fn hotspots_geojson(State(state): State<AppState>) -> ServeResult<Json<Value>> {
    state.ensure_serving()?;
    state
        .registry
        .snapshot()
        .datasets()
        .hotspots
        .clone()
        .map(Json)
        .ok_or_else(|| ServeError::DatasetMissing("hotspots.geojson not available".to_string()))
}

fn survival_section(state: &AppState, key: &str, label: &str) -> ServeResult<Json<Value>> {
    state.ensure_serving()?;
    state
        .registry
        .snapshot()
        .datasets()
        .survival
        .as_ref()
        .and_then(|s| s.get(key))
        .cloned()
        .map(Json)
        .ok_or_else(|| ServeError::DatasetMissing(format!("{label} not available")))
}

pub async fn survival_km(State(state): State<AppState>) -> ServeResult<Json<Value>> {
    survival_section(&state, "km", "KM")
}

pub async fn survival_cox_summary(State(state): State<AppState>) -> ServeResult<Json<Value>> {
    survival_section(&state, "cox_summary", "Cox summary")
}
