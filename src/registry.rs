//! In-memory directory of servable model versions.
//!
//! Readers load the current [`RegistrySnapshot`] through an `ArcSwap` and never
//! lock. Writers build a complete new snapshot and swap it in, so a reader sees
//! either the whole of a published batch or none of it.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::artifact::{compare_versions, ArtifactLoad, ModelArtifact, ReferenceData};
use crate::error::{ServeError, ServeResult};

/// All versions of one model name.
#[derive(Debug, Clone)]
pub struct ModelVersions {
    versions: BTreeMap<String, Arc<ModelArtifact>>,
    active: String,
}

impl ModelVersions {
    fn build(versions: BTreeMap<String, Arc<ModelArtifact>>) -> Option<Self> {
        let newest = |flagged_only: bool| {
            versions
                .values()
                .filter(|a| !flagged_only || a.active)
                .map(|a| a.version.as_str())
                .max_by(|a, b| compare_versions(a, b))
                .map(str::to_string)
        };
        let active = newest(true).or_else(|| newest(false))?;
        Some(Self { versions, active })
    }

    pub fn active(&self) -> &Arc<ModelArtifact> {
        &self.versions[&self.active]
    }

    pub fn active_version(&self) -> &str {
        &self.active
    }

    pub fn get(&self, version: &str) -> Option<&Arc<ModelArtifact>> {
        self.versions.get(version)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Versions from oldest to newest.
    fn ordered(&self) -> Vec<&Arc<ModelArtifact>> {
        let mut all: Vec<_> = self.versions.values().collect();
        all.sort_by(|a, b| compare_versions(&a.version, &b.version));
        all
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub version: String,
    pub active: bool,
    pub family: &'static str,
    pub features: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source: String,
    pub loaded_at: DateTime<Utc>,
}

/// Immutable registry state. Replaced wholesale, never mutated.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    models: BTreeMap<String, ModelVersions>,
    datasets: Arc<ReferenceData>,
    generation: u64,
    published_at: Option<DateTime<Utc>>,
}

impl RegistrySnapshot {
    fn assemble(
        artifacts: BTreeMap<String, BTreeMap<String, Arc<ModelArtifact>>>,
        datasets: Arc<ReferenceData>,
        generation: u64,
    ) -> Self {
        let models = artifacts
            .into_iter()
            .filter_map(|(name, versions)| ModelVersions::build(versions).map(|v| (name, v)))
            .collect();
        Self {
            models,
            datasets,
            generation,
            published_at: Some(Utc::now()),
        }
    }

    fn grouped(batch: Vec<ModelArtifact>) -> BTreeMap<String, BTreeMap<String, Arc<ModelArtifact>>> {
        let mut out: BTreeMap<String, BTreeMap<String, Arc<ModelArtifact>>> = BTreeMap::new();
        for artifact in batch {
            out.entry(artifact.name.clone())
                .or_default()
                .insert(artifact.version.clone(), Arc::new(artifact));
        }
        out
    }

    pub fn resolve(&self, name: &str, version: Option<&str>) -> ServeResult<Arc<ModelArtifact>> {
        let model = self
            .models
            .get(name)
            .ok_or_else(|| ServeError::NotFound(name.to_string()))?;
        match version {
            None => Ok(model.active().clone()),
            Some(v) => model
                .get(v)
                .cloned()
                .ok_or_else(|| ServeError::VersionNotFound {
                    name: name.to_string(),
                    version: v.to_string(),
                }),
        }
    }

    pub fn list_models(&self) -> Vec<ModelSummary> {
        self.models
            .values()
            .flat_map(|m| {
                m.ordered().into_iter().map(move |a| ModelSummary {
                    name: a.name.clone(),
                    version: a.version.clone(),
                    active: a.version == m.active_version(),
                    family: a.family.name(),
                    features: a.schema.fields().len(),
                    description: a.description.clone(),
                    source: a.source.display().to_string(),
                    loaded_at: a.loaded_at,
                })
            })
            .collect()
    }

    pub fn model(&self, name: &str) -> Option<&ModelVersions> {
        self.models.get(name)
    }

    /// Number of published artifacts across all names.
    pub fn artifact_count(&self) -> usize {
        self.models.values().map(ModelVersions::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn datasets(&self) -> &ReferenceData {
        &self.datasets
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    fn artifacts(&self) -> BTreeMap<String, BTreeMap<String, Arc<ModelArtifact>>> {
        self.models
            .iter()
            .map(|(name, m)| (name.clone(), m.versions.clone()))
            .collect()
    }
}

/// Shared registry handle; the single source of truth for request handlers.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    current: ArcSwap<RegistrySnapshot>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    /// Replace the published models with exactly `batch`; datasets are kept.
    pub fn publish(&self, batch: Vec<ModelArtifact>) -> Arc<RegistrySnapshot> {
        let grouped = RegistrySnapshot::grouped(batch);
        self.swap(|old| {
            RegistrySnapshot::assemble(grouped.clone(), old.datasets.clone(), old.generation + 1)
        })
    }

    /// Merge `batch` over the published models, replacing equal `(name, version)` keys.
    pub fn extend(&self, batch: Vec<ModelArtifact>) -> Arc<RegistrySnapshot> {
        let grouped = RegistrySnapshot::grouped(batch);
        self.swap(|old| {
            let mut merged = old.artifacts();
            for (name, versions) in &grouped {
                let slot = merged.entry(name.clone()).or_default();
                for (version, artifact) in versions {
                    slot.insert(version.clone(), artifact.clone());
                }
            }
            RegistrySnapshot::assemble(merged, old.datasets.clone(), old.generation + 1)
        })
    }

    /// Replace models and reference datasets together with one directory load.
    pub fn publish_load(&self, load: ArtifactLoad) -> Arc<RegistrySnapshot> {
        let grouped = RegistrySnapshot::grouped(load.artifacts);
        let datasets = Arc::new(load.datasets);
        self.swap(|old| {
            RegistrySnapshot::assemble(grouped.clone(), datasets.clone(), old.generation + 1)
        })
    }

    pub fn resolve(&self, name: &str, version: Option<&str>) -> ServeResult<Arc<ModelArtifact>> {
        self.current.load().resolve(name, version)
    }

    pub fn list_models(&self) -> Vec<ModelSummary> {
        self.current.load().list_models()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    fn swap(&self, build: impl Fn(&RegistrySnapshot) -> RegistrySnapshot) -> Arc<RegistrySnapshot> {
        // `rcu` retries the build if another writer published in between.
        let mut published: Arc<RegistrySnapshot> = Arc::default();
        self.current.rcu(|old| {
            published = Arc::new(build(old.as_ref()));
            published.clone()
        });
        tracing::info!(
            generation = published.generation(),
            models = published.models.len(),
            artifacts = published.artifact_count(),
            "registry snapshot published"
        );
        published
    }
}
