use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::artifact::initial_load;
use crate::config::Config;
use crate::error::{ServeError, ServeResult};
use crate::{v1, AppState};

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false);

    match config.cors_origins() {
        None => layer.allow_origin(Any),
        Some(origins) if origins.iter().any(|o| o == "*") => layer.allow_origin(Any),
        Some(origins) => {
            let values: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(origin = %origin, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(AllowOrigin::list(values))
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(v1::health_check))
        .route("/v1/models", get(v1::list_models))
        .route("/v1/predict", post(v1::predict))
        .route("/v1/admin/reload", post(v1::reload_models))
        .route("/routes", get(v1::list_routes))
        .route("/forecast/:route_id", get(v1::route_forecast))
        .route("/risk/score", get(v1::risk_score))
        .route("/risk/top", get(v1::risk_top))
        .route("/hotspots.geojson", get(v1::hotspots_geojson))
        .route("/survival/km", get(v1::survival_km))
        .route("/survival/cox_summary", get(v1::survival_cox_summary))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Load the artifact directory and publish it, moving the lifecycle to `serving`.
///
/// On failure the lifecycle is marked `failed` and the error is returned.
pub async fn bootstrap(state: &AppState) -> ServeResult<usize> {
    let reader = state.reader.clone();
    let loaded = tokio::task::spawn_blocking(move || initial_load(&reader))
        .await
        .map_err(|e| ServeError::StartupFatal(format!("artifact loader panicked: {e}")));

    let load = match loaded.and_then(|r| r) {
        Ok(load) => load,
        Err(e) => {
            state.lifecycle.mark_failed(e.to_string());
            return Err(e);
        }
    };

    let count = load.artifacts.len();
    state.registry.publish_load(load);
    state.lifecycle.mark_serving();
    Ok(count)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Bind, start answering `/health`, load artifacts, then serve until shutdown.
pub async fn run(config: Config) -> ServeResult<()> {
    let port = config.port;
    let state = AppState::new(config);
    let app = router(state.clone());

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| ServeError::StartupFatal(format!("failed to bind port {port}: {e}")))?;

    info!("mta-models starting on http://0.0.0.0:{port}");
    info!("Available endpoints:");
    info!("  - GET  /health            - Readiness check");
    info!("  - GET  /v1/models         - List published models");
    info!("  - POST /v1/predict        - Run a prediction");
    info!("  - POST /v1/admin/reload   - Reload the artifact directory");
    info!("  - GET  /routes, /forecast/:route_id, /risk/score, /risk/top");
    info!("  - GET  /hotspots.geojson, /survival/km, /survival/cox_summary");

    let slots = state.inference_slots.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                info!("shutdown signal received, draining connections");
                slots.close();
            })
            .await
    });

    info!(dir = %state.reader.dir().display(), "loading model artifacts");
    let count = bootstrap(&state).await?;
    info!(models = count, "serving");

    server
        .await
        .map_err(|e| ServeError::Internal(format!("server task failed: {e}")))?
        .map_err(|e| ServeError::Internal(format!("server error: {e}")))?;

    info!("Goodbye!");
    Ok(())
}
