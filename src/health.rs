//! Readiness derived from process lifecycle, registry and inference slots.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Semaphore;

use crate::registry::ModelRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Starting,
    Serving,
    Failed,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Serving,
            2 => Self::Failed,
            _ => Self::Starting,
        }
    }
}

/// `starting` -> `serving` once, or `starting` -> `failed` on a fatal startup error.
#[derive(Debug)]
pub struct Lifecycle {
    phase: AtomicU8,
    fatal: OnceLock<String>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Starting as u8),
            fatal: OnceLock::new(),
        }
    }
}

impl Lifecycle {
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn mark_serving(&self) {
        let _ = self.phase.compare_exchange(
            Phase::Starting as u8,
            Phase::Serving as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn mark_failed(&self, reason: impl Into<String>) {
        let _ = self.fatal.set(reason.into());
        self.phase.store(Phase::Failed as u8, Ordering::Release);
    }

    pub fn fatal(&self) -> Option<&str> {
        self.fatal.get().map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub ready: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    pub phase: Phase,
    pub models: usize,
    pub generation: u64,
    pub artifacts: BTreeMap<&'static str, bool>,
    pub snapshot: Value,
    pub cors: CorsInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorsInfo {
    pub allow_origins: Vec<String>,
}

/// Cheap, non-blocking readiness probe. Only reads atomics and the current snapshot.
#[derive(Clone)]
pub struct HealthMonitor {
    lifecycle: Arc<Lifecycle>,
    registry: Arc<ModelRegistry>,
    slots: Arc<Semaphore>,
    allow_origins: Vec<String>,
}

impl HealthMonitor {
    /// `allow_origins` of `None` is reported as `["*"]`.
    pub fn new(
        lifecycle: Arc<Lifecycle>,
        registry: Arc<ModelRegistry>,
        slots: Arc<Semaphore>,
        allow_origins: Option<Vec<String>>,
    ) -> Self {
        Self {
            lifecycle,
            registry,
            slots,
            allow_origins: allow_origins.unwrap_or_else(|| vec!["*".to_string()]),
        }
    }

    pub fn check_health(&self) -> HealthStatus {
        let snapshot = self.registry.snapshot();
        let phase = self.lifecycle.phase();
        let mut reasons = Vec::new();

        match phase {
            Phase::Starting => reasons.push("initial artifact load in progress".to_string()),
            Phase::Failed => reasons.push(format!(
                "startup failed: {}",
                self.lifecycle.fatal().unwrap_or("unknown error")
            )),
            Phase::Serving => {}
        }
        if snapshot.is_empty() {
            reasons.push("no model artifacts published".to_string());
        }
        if self.slots.is_closed() {
            reasons.push("inference worker pool is shut down".to_string());
        }

        HealthStatus {
            ready: reasons.is_empty(),
            reasons,
            phase,
            models: snapshot.artifact_count(),
            generation: snapshot.generation(),
            artifacts: snapshot.datasets().presence(),
            snapshot: snapshot.datasets().snapshot.clone().unwrap_or(Value::Object(Default::default())),
            cors: CorsInfo {
                allow_origins: self.allow_origins.clone(),
            },
        }
    }
}
