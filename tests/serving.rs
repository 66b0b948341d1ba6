mod common;

use http::StatusCode;
use serde_json::json;
use std::fs;

use common::*;
use mta_models::artifact::{initial_load, ArtifactStoreReader};
use mta_models::error::ServeError;
use mta_models::health::Phase;
use mta_models::server::{bootstrap, router};

#[tokio::test]
async fn minimal_scenario_loads_two_and_reports_one() {
    let dir = tempfile::tempdir().unwrap();
    write_json(dir.path(), "modelA_v1.model.json", &linear_artifact("modelA", "v1", 1.0));
    write_json(dir.path(), "modelA_v2.model.json", &linear_artifact("modelA", "v2", 2.0));
    fs::write(dir.path().join("modelB_broken.model.json"), "not json at all").unwrap();

    let load = initial_load(&ArtifactStoreReader::new(dir.path())).unwrap();
    assert_eq!(load.artifacts.len(), 2);
    assert_eq!(load.failures.len(), 1);
    assert!(load.failures[0].file.ends_with("modelB_broken.model.json"));

    let state = state_for(dir.path());
    assert_eq!(bootstrap(&state).await.unwrap(), 2);
    assert_eq!(state.registry.resolve("modelA", None).unwrap().version, "v2");
    assert_eq!(state.registry.resolve("modelA", Some("v1")).unwrap().version, "v1");
    assert!(matches!(
        state.registry.resolve("modelB", None),
        Err(ServeError::NotFound(_))
    ));

    let (status, body) = send(router(state), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], json!(true));
}

#[tokio::test]
async fn health_is_not_ready_before_initial_load() {
    let dir = scenario_dir();
    let state = state_for(dir.path());
    let app = router(state.clone());

    let (status, body) = send(app.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], json!(false));
    assert!(!body["reasons"].as_array().unwrap().is_empty());

    let (status, body) = send(
        app.clone(),
        post_json("/v1/predict", &json!({"model": "modelA", "features": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["kind"], json!("starting"));

    for uri in [
        "/v1/models",
        "/routes",
        "/forecast/M15",
        "/risk/top",
        "/hotspots.geojson",
        "/survival/km",
        "/survival/cox_summary",
        "/risk/score?avg_speed_mph=5&trips_per_hour=3",
    ] {
        let (status, body) = send(app.clone(), get(uri)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        assert_eq!(body["error"]["kind"], json!("starting"), "{uri}");
    }
    let (status, body) = send(app.clone(), post_json("/v1/admin/reload", &json!({}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["kind"], json!("starting"));

    bootstrap(&state).await.unwrap();
    let (status, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], json!(true));
    assert!(body.get("reasons").is_none());
    assert_eq!(body["models"], json!(4));
    assert_eq!(body["artifacts"]["forecasts"], json!(true));
    assert_eq!(body["snapshot"]["snapshot_as_of"], json!("2025-06-01"));
    assert_eq!(body["cors"]["allow_origins"], json!(["*"]));
}

#[tokio::test]
async fn zero_artifacts_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("only_broken.model.json"), "{}").unwrap();
    let state = state_for(dir.path());

    let err = bootstrap(&state).await.unwrap_err();
    assert_eq!(err.kind(), "startup_fatal");
    assert_eq!(state.lifecycle.phase(), Phase::Failed);

    let (status, body) = send(router(state), get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let reasons = body["reasons"].as_array().unwrap();
    assert!(reasons.iter().any(|r| r.as_str().unwrap().starts_with("startup failed")));
}

#[tokio::test]
async fn missing_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_for(dir.path().join("absent"));
    let err = bootstrap(&state).await.unwrap_err();
    assert!(matches!(err, ServeError::StartupFatal(_)));
}

#[tokio::test]
async fn predictions_resolve_active_and_pinned_versions() {
    let dir = scenario_dir();
    let state = state_for(dir.path());
    bootstrap(&state).await.unwrap();
    let app = router(state);

    let features = json!({"avg_speed_mph": 10.0, "trips_per_hour": 50.0});
    let (status, body) = send(
        app.clone(),
        post_json("/v1/predict", &json!({"model": "modelA", "features": features})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], json!("modelA"));
    assert_eq!(body["version"], json!("v2"));
    assert_eq!(body["prediction"]["type"], json!("score"));
    let score = body["prediction"]["score"].as_f64().unwrap();
    assert!((score - 2.0).abs() < 1e-9);
    assert!(body["request_id"].is_string());
    assert!(body["timestamp"].is_string());

    let (status, body) = send(
        app.clone(),
        post_json(
            "/v1/predict",
            &json!({"model": "modelA", "version": "v1", "features": features}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], json!("v1"));
    assert!((body["prediction"]["score"].as_f64().unwrap() - 1.0).abs() < 1e-9);

    let (status, body) = send(
        app.clone(),
        post_json("/v1/predict", &json!({"model": "modelB", "features": features})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], json!("not_found"));

    let (status, body) = send(
        app,
        post_json(
            "/v1/predict",
            &json!({"model": "modelA", "version": "v7", "features": features}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], json!("version_not_found"));
}

#[tokio::test]
async fn validation_errors_name_the_field() {
    let dir = scenario_dir();
    let state = state_for(dir.path());
    bootstrap(&state).await.unwrap();
    let app = router(state);

    let cases = [
        (json!({"avg_speed_mph": 1.0}), "missing_field", "trips_per_hour"),
        (
            json!({"avg_speed_mph": 1.0, "trips_per_hour": 2.0, "weather": "rain"}),
            "unknown_field",
            "weather",
        ),
        (
            json!({"avg_speed_mph": "slow", "trips_per_hour": 2.0}),
            "type_mismatch",
            "avg_speed_mph",
        ),
    ];
    for (features, reason, field) in cases {
        let (status, body) = send(
            app.clone(),
            post_json("/v1/predict", &json!({"model": "modelA", "features": features})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["kind"], json!("validation_error"));
        assert_eq!(body["error"]["reason"], json!(reason));
        assert_eq!(body["error"]["field"], json!(field));
    }
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let dir = scenario_dir();
    let state = state_for(dir.path());
    bootstrap(&state).await.unwrap();
    let app = router(state);

    let req = http::Request::builder()
        .method("POST")
        .uri("/v1/predict")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{\"model\": "))
        .unwrap();
    let (status, body) = send(app.clone(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], json!("bad_request"));

    let (status, _) = send(
        app.clone(),
        post_json("/v1/predict", &json!({"model": "modelA", "features": [1, 2]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app, post_json("/v1/predict", &json!({"model": " "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn attribution_and_tree_families_are_served() {
    let dir = scenario_dir();
    let state = state_for(dir.path());
    bootstrap(&state).await.unwrap();
    let app = router(state);

    let (status, body) = send(
        app.clone(),
        post_json(
            "/v1/predict",
            &json!({"model": "touch", "features": {"search": 2, "social": 0, "email": 1, "conversion_value": 30.0}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"]["type"], json!("attribution"));
    assert_eq!(
        body["prediction"]["credits"],
        json!([
            {"channel": "search", "credit": 15.0},
            {"channel": "social", "credit": 0.0},
            {"channel": "email", "credit": 15.0}
        ])
    );

    let (status, body) = send(
        app,
        post_json(
            "/v1/predict",
            &json!({"model": "xgb_risk", "features": {"avg_speed_mph": 6.0, "trips_per_hour": 1.0}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"]["score"], json!(0.75));
}

#[tokio::test]
async fn list_models_reports_active_flags() {
    let dir = scenario_dir();
    let state = state_for(dir.path());
    bootstrap(&state).await.unwrap();

    let (status, body) = send(router(state), get("/v1/models")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generation"], json!(1));
    let models = body["models"].as_array().unwrap();
    assert_eq!(models.len(), 4);

    let model_a: Vec<_> = models.iter().filter(|m| m["name"] == json!("modelA")).collect();
    assert_eq!(model_a.len(), 2);
    assert_eq!(model_a[0]["version"], json!("v1"));
    assert_eq!(model_a[0]["active"], json!(false));
    assert_eq!(model_a[1]["version"], json!("v2"));
    assert_eq!(model_a[1]["active"], json!(true));
    assert_eq!(model_a[1]["family"], json!("linear"));
}

#[tokio::test]
async fn reload_publishes_new_versions_and_keeps_old_on_failure() {
    let dir = scenario_dir();
    let state = state_for(dir.path());
    bootstrap(&state).await.unwrap();
    let app = router(state.clone());

    write_json(dir.path(), "modelA_v3.model.json", &linear_artifact("modelA", "v3", 3.0));
    let (status, body) = send(app.clone(), post_json("/v1/admin/reload", &json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generation"], json!(2));
    assert_eq!(body["loaded"], json!(5));
    assert_eq!(body["failures"].as_array().unwrap().len(), 1);
    assert_eq!(state.registry.resolve("modelA", None).unwrap().version, "v3");

    for entry in fs::read_dir(dir.path()).unwrap() {
        let path = entry.unwrap().path();
        if path.to_string_lossy().ends_with(".model.json") {
            fs::remove_file(path).unwrap();
        }
    }
    let (status, body) = send(app, post_json("/v1/admin/reload", &json!({}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["kind"], json!("reload_failed"));
    assert_eq!(state.registry.snapshot().generation(), 2);
    assert_eq!(state.registry.resolve("modelA", None).unwrap().version, "v3");
}

#[tokio::test]
async fn reference_dataset_routes() {
    let dir = scenario_dir();
    let state = state_for(dir.path());
    bootstrap(&state).await.unwrap();
    let app = router(state);

    let (status, body) = send(app.clone(), get("/routes")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"routes": ["B46", "M15"], "count": 2}));

    let (status, body) = send(app.clone(), get("/forecast/M15")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["forecast"], json!([4, 5]));

    let (status, body) = send(app.clone(), get("/forecast/Q99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], json!("dataset_missing"));

    let (_, body) = send(app.clone(), get("/risk/top")).await;
    assert_eq!(body.as_array().unwrap().len(), 100);
    let (_, body) = send(app.clone(), get("/risk/top?limit=1000")).await;
    assert_eq!(body.as_array().unwrap().len(), 200);
    let (_, body) = send(app.clone(), get("/risk/top?limit=-4")).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    let (status, _) = send(app.clone(), get("/risk/top?limit=lots")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(app.clone(), get("/hotspots.geojson")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], json!("FeatureCollection"));

    let (_, body) = send(app.clone(), get("/survival/km")).await;
    assert_eq!(body, json!({"timeline": [0, 1]}));
    let (_, body) = send(app, get("/survival/cox_summary")).await;
    assert_eq!(body, json!({"coef": 0.3}));
}

#[tokio::test]
async fn absent_datasets_map_to_documented_statuses() {
    let dir = tempfile::tempdir().unwrap();
    write_json(dir.path(), "modelA_v1.model.json", &linear_artifact("modelA", "v1", 1.0));
    let state = state_for(dir.path());
    bootstrap(&state).await.unwrap();
    let app = router(state);

    let (status, body) = send(app.clone(), get("/routes")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(0));

    let (status, _) = send(app.clone(), get("/forecast/M15")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (status, _) = send(app.clone(), get("/risk/top")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(app.clone(), get("/hotspots.geojson")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(app.clone(), get("/survival/km")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(app, get("/risk/score?avg_speed_mph=5&trips_per_hour=3")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["kind"], json!("unavailable"));
}

#[tokio::test]
async fn risk_score_uses_query_parameters() {
    let dir = scenario_dir();
    let state = state_for(dir.path());
    bootstrap(&state).await.unwrap();
    let app = router(state);

    let (status, body) = send(app.clone(), get("/risk/score?avg_speed_mph=12.5&trips_per_hour=40")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["risk_score"], json!(0.25));
    assert_eq!(body["model"], json!("xgb_risk"));

    let (status, body) = send(
        app.clone(),
        get("/risk/score?avg_speed_mph=12.5&trips_per_hour=40&_=1718000000&utm_source=dash"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["risk_score"], json!(0.25));

    let (status, body) = send(app.clone(), get("/risk/score?avg_speed_mph=fast&trips_per_hour=40")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["field"], json!("avg_speed_mph"));

    let (status, body) = send(app, get("/risk/score?avg_speed_mph=3")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["reason"], json!("missing_field"));
}

#[tokio::test]
async fn cors_headers_are_present() {
    let dir = scenario_dir();
    let state = state_for(dir.path());
    bootstrap(&state).await.unwrap();

    let req = http::Request::builder()
        .uri("/health")
        .header("origin", "https://dashboard.example")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = tower::ServiceExt::oneshot(router(state), req).await.unwrap();
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}
