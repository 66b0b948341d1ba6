use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::datasets::{ReferenceData, DATASET_FILES};
use super::{ModelArtifact, ModelKey};
use crate::error::{ArtifactError, ServeError, ServeResult};

/// File-name suffix marking a model artifact.
pub const ARTIFACT_SUFFIX: &str = ".model.json";

#[derive(Debug)]
pub struct LoadFailure {
    pub file: PathBuf,
    pub error: ArtifactError,
}

impl LoadFailure {
    pub fn new(file: PathBuf, error: ArtifactError) -> Self {
        Self { file, error }
    }
}

/// Outcome of reading one artifact directory.
#[derive(Debug, Default)]
pub struct ArtifactLoad {
    pub artifacts: Vec<ModelArtifact>,
    pub failures: Vec<LoadFailure>,
    /// Files that are neither artifacts nor reference datasets.
    pub skipped: Vec<PathBuf>,
    pub datasets: ReferenceData,
    pub dataset_failures: Vec<LoadFailure>,
}

#[derive(Debug, Clone)]
pub struct ArtifactStoreReader {
    dir: PathBuf,
}

impl ArtifactStoreReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read every artifact in the directory.
    ///
    /// Bad files are collected in `failures`; only a missing or unreadable
    /// directory is an error.
    pub fn load(&self) -> ServeResult<ArtifactLoad> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            ServeError::StartupFatal(format!(
                "cannot read artifact directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let is_file = entry.file_type().map(|t| t.is_file() || t.is_symlink()).unwrap_or(false);
            if is_file {
                files.push((name, entry.path()));
            }
        }
        files.sort();

        let mut load = ArtifactLoad::default();
        let mut seen: HashMap<ModelKey, PathBuf> = HashMap::new();

        for (name, path) in files {
            if !name.ends_with(ARTIFACT_SUFFIX) {
                if DATASET_FILES.contains(&name.as_str()) {
                    continue;
                }
                if name.ends_with(".pkl") || name.ends_with(".joblib") {
                    warn!(file = %path.display(), "unsupported serialized model format, skipping");
                } else {
                    debug!(file = %path.display(), "not an artifact, skipping");
                }
                load.skipped.push(path);
                continue;
            }

            match ModelArtifact::read(&path) {
                Ok(artifact) => {
                    let key = artifact.key();
                    if let Some(first) = seen.get(&key) {
                        let error = ArtifactError::Duplicate {
                            name: key.name,
                            version: key.version,
                            first: first.display().to_string(),
                        };
                        warn!(file = %path.display(), error = %error, "artifact rejected");
                        load.failures.push(LoadFailure::new(path, error));
                        continue;
                    }
                    info!(
                        model = %artifact.name,
                        version = %artifact.version,
                        family = artifact.family.name(),
                        file = %path.display(),
                        "artifact loaded"
                    );
                    seen.insert(key, path);
                    load.artifacts.push(artifact);
                }
                Err(error) => {
                    warn!(file = %path.display(), error = %error, "artifact rejected");
                    load.failures.push(LoadFailure::new(path, error));
                }
            }
        }

        let (datasets, dataset_failures) = ReferenceData::load(&self.dir);
        for failure in &dataset_failures {
            warn!(file = %failure.file.display(), error = %failure.error, "reference dataset rejected");
        }
        load.datasets = datasets;
        load.dataset_failures = dataset_failures;

        Ok(load)
    }
}

/// Startup load: a directory that yields no artifact at all is fatal.
pub fn initial_load(reader: &ArtifactStoreReader) -> ServeResult<ArtifactLoad> {
    let load = reader.load()?;
    if load.artifacts.is_empty() {
        return Err(ServeError::StartupFatal(format!(
            "no loadable artifacts in {} ({} rejected)",
            reader.dir().display(),
            load.failures.len()
        )));
    }
    info!(
        loaded = load.artifacts.len(),
        rejected = load.failures.len(),
        skipped = load.skipped.len(),
        dir = %reader.dir().display(),
        "artifact directory loaded"
    );
    Ok(load)
}
