//! Model artifact serving engine.
//!
//! Loads `*.model.json` artifacts and reference datasets from a directory,
//! publishes them as an immutable registry snapshot and serves inference,
//! health and dataset routes over HTTP.

pub mod artifact;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod registry;
pub mod server;
pub mod v1;

use std::sync::Arc;
use tokio::sync::Semaphore;

use artifact::ArtifactStoreReader;
use config::Config;
use error::{ServeError, ServeResult};
use health::{HealthMonitor, Lifecycle, Phase};
use registry::ModelRegistry;

/// State shared by every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ModelRegistry>,
    pub lifecycle: Arc<Lifecycle>,
    pub inference_slots: Arc<Semaphore>,
    pub reader: ArtifactStoreReader,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let slots = config.max_concurrent_inferences.max(1);
        Self {
            reader: ArtifactStoreReader::new(config.artifacts_dir.clone()),
            config: Arc::new(config),
            registry: Arc::new(ModelRegistry::new()),
            lifecycle: Arc::new(Lifecycle::default()),
            inference_slots: Arc::new(Semaphore::new(slots)),
        }
    }

    pub fn health(&self) -> HealthMonitor {
        HealthMonitor::new(
            self.lifecycle.clone(),
            self.registry.clone(),
            self.inference_slots.clone(),
            self.config.cors_origins(),
        )
    }

    /// Reject model traffic until the initial load has been published.
    pub fn ensure_serving(&self) -> ServeResult<()> {
        match self.lifecycle.phase() {
            Phase::Serving => Ok(()),
            Phase::Starting => Err(ServeError::Starting),
            Phase::Failed => Err(ServeError::Unavailable(format!(
                "startup failed: {}",
                self.lifecycle.fatal().unwrap_or("unknown error")
            ))),
        }
    }
}
