//! Precomputed reference datasets exported next to the model artifacts.
//!
//! They are served verbatim and are optional: a missing file simply leaves the
//! dataset absent, a malformed one is reported and skipped.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::LoadFailure;
use crate::error::ArtifactError;

pub const FORECASTS_FILE: &str = "forecasts.json";
pub const SNAPSHOT_FILE: &str = "snapshot.json";
pub const HOTSPOTS_FILE: &str = "hotspots.geojson";
pub const SURVIVAL_FILE: &str = "survival.json";
pub const TOP_CANDIDATES_FILE: &str = "top_candidates.json";

pub const DATASET_FILES: [&str; 5] = [
    FORECASTS_FILE,
    SNAPSHOT_FILE,
    HOTSPOTS_FILE,
    SURVIVAL_FILE,
    TOP_CANDIDATES_FILE,
];

#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    /// Route id -> forecast payload.
    pub forecasts: Option<Map<String, Value>>,
    /// Export metadata, e.g. `snapshot_as_of`.
    pub snapshot: Option<Value>,
    /// GeoJSON FeatureCollection.
    pub hotspots: Option<Value>,
    /// Holds `km` and `cox_summary`.
    pub survival: Option<Map<String, Value>>,
    pub top_candidates: Option<Vec<Value>>,
}

impl ReferenceData {
    pub fn load(dir: &Path) -> (Self, Vec<LoadFailure>) {
        let mut failures = Vec::new();
        let mut read = |name: &str| -> Option<Value> {
            let path = dir.join(name);
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => return None,
                Err(e) => {
                    failures.push(LoadFailure::new(path, e.into()));
                    return None;
                }
            };
            match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    failures.push(LoadFailure::new(path, e.into()));
                    None
                }
            }
        };

        let forecasts = read(FORECASTS_FILE);
        let snapshot = read(SNAPSHOT_FILE);
        let hotspots = read(HOTSPOTS_FILE);
        let survival = read(SURVIVAL_FILE);
        let top_candidates = read(TOP_CANDIDATES_FILE);

        let mut misshaped = |name: &str| {
            failures.push(LoadFailure::new(
                dir.join(name),
                ArtifactError::invalid("unexpected JSON shape"),
            ));
        };

        let forecasts = match forecasts {
            Some(Value::Object(map)) => Some(map),
            Some(_) => {
                misshaped(FORECASTS_FILE);
                None
            }
            None => None,
        };
        let survival = match survival {
            Some(Value::Object(map)) => Some(map),
            Some(_) => {
                misshaped(SURVIVAL_FILE);
                None
            }
            None => None,
        };
        let top_candidates = match top_candidates {
            Some(Value::Array(rows)) => Some(rows),
            Some(_) => {
                misshaped(TOP_CANDIDATES_FILE);
                None
            }
            None => None,
        };
        let hotspots = match hotspots {
            Some(v) if v.is_object() => Some(v),
            Some(_) => {
                misshaped(HOTSPOTS_FILE);
                None
            }
            None => None,
        };

        let data = Self {
            forecasts,
            snapshot,
            hotspots,
            survival,
            top_candidates,
        };
        (data, failures)
    }

    /// Which datasets are available, keyed by short name.
    pub fn presence(&self) -> BTreeMap<&'static str, bool> {
        BTreeMap::from([
            ("forecasts", self.forecasts.is_some()),
            ("snapshot", self.snapshot.is_some()),
            ("hotspots", self.hotspots.is_some()),
            ("survival", self.survival.is_some()),
            ("top_candidates", self.top_candidates.is_some()),
        ])
    }
}
