#![allow(dead_code)]

use axum::body::Body;
use axum::Router;
use http::{Request, StatusCode};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tower::ServiceExt;

use mta_models::config::Config;
use mta_models::AppState;

pub fn linear_artifact(name: &str, version: &str, intercept: f64) -> Value {
    json!({
        "format_version": 1,
        "name": name,
        "version": version,
        "description": "speed/volume risk weighting",
        "schema": [
            {"name": "avg_speed_mph", "type": "number", "required": true},
            {"name": "trips_per_hour", "type": "number", "required": true},
            {"name": "borough", "type": "string", "required": false}
        ],
        "model": {
            "family": "linear",
            "intercept": intercept,
            "weights": {"avg_speed_mph": -0.05, "trips_per_hour": 0.01},
            "categorical": {"borough": {"MN": 0.25}}
        }
    })
}

pub fn tree_artifact(name: &str, version: &str) -> Value {
    json!({
        "format_version": 1,
        "name": name,
        "version": version,
        "schema": [
            {"name": "avg_speed_mph", "type": "number"},
            {"name": "trips_per_hour", "type": "number"}
        ],
        "model": {
            "family": "tree_ensemble",
            "base_score": 0.5,
            "trees": [[
                {"feature": "avg_speed_mph", "threshold": 10.0, "left": 1, "right": 2},
                {"leaf": 0.25},
                {"leaf": -0.25}
            ]]
        }
    })
}

pub fn allocation_artifact(name: &str, version: &str) -> Value {
    json!({
        "format_version": 1,
        "name": name,
        "version": version,
        "schema": [
            {"name": "search", "type": "integer"},
            {"name": "social", "type": "integer"},
            {"name": "email", "type": "integer"},
            {"name": "conversion_value", "type": "number", "required": false}
        ],
        "model": {
            "family": "touchpoint_allocation",
            "channels": [{"field": "search"}, {"field": "social"}, {"field": "email"}],
            "strategy": {"type": "equal"},
            "value_field": "conversion_value"
        }
    })
}

pub fn write_json(dir: &Path, file: &str, body: &Value) {
    fs::write(dir.join(file), serde_json::to_vec_pretty(body).unwrap()).unwrap();
}

/// modelA v1 + v2, a corrupt modelB file, the risk model and reference datasets.
pub fn scenario_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path();
    write_json(p, "modelA_v1.model.json", &linear_artifact("modelA", "v1", 1.0));
    write_json(p, "modelA_v2.model.json", &linear_artifact("modelA", "v2", 2.0));
    fs::write(p.join("modelB_broken.model.json"), "{\"format_version\": 1, \"name\": \"modelB\"").unwrap();
    write_json(p, "xgb_risk.model.json", &tree_artifact("xgb_risk", "v1"));
    write_json(p, "touch.model.json", &allocation_artifact("touch", "2024.1"));

    write_json(p, "snapshot.json", &json!({"snapshot_as_of": "2025-06-01"}));
    write_json(
        p,
        "forecasts.json",
        &json!({
            "M15": {"history": [1, 2, 3], "forecast": [4, 5]},
            "B46": {"history": [7], "forecast": [8]}
        }),
    );
    let rows: Vec<Value> = (0..250).map(|i| json!({"segment": i, "risk": 1.0 - f64::from(i) / 1000.0})).collect();
    write_json(p, "top_candidates.json", &Value::Array(rows));
    write_json(p, "hotspots.geojson", &json!({"type": "FeatureCollection", "features": []}));
    write_json(p, "survival.json", &json!({"km": {"timeline": [0, 1]}, "cox_summary": {"coef": 0.3}}));
    dir
}

pub fn state_for(dir: impl AsRef<Path>) -> AppState {
    AppState::new(Config::for_dir(dir.as_ref()))
}

pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}
