pub mod datasets;
pub mod health;
pub mod inference;
pub mod models;

pub use datasets::{
    hotspots_geojson, list_routes, risk_top, route_forecast, survival_cox_summary, survival_km,
    RouteListResponse,
};
pub use health::health_check;
pub use inference::{predict, risk_score, run_inference, InferenceRequest, RiskScoreResponse};
pub use models::{list_models, reload_models, ModelListResponse, ReloadResponse};
