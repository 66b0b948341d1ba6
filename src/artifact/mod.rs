//! Model artifacts and the directory reader that produces them.

pub mod datasets;
pub mod loader;
pub mod version;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::{FeatureField, FeatureSchema, ModelFamily, ModelSpec};
use crate::error::ArtifactError;

pub use datasets::ReferenceData;
pub use loader::{initial_load, ArtifactLoad, ArtifactStoreReader, LoadFailure, ARTIFACT_SUFFIX};
pub use version::compare_versions;

/// Artifact format versions this build can read.
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

/// On-disk layout of a `*.model.json` file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactFile {
    pub format_version: u32,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub description: Option<String>,
    pub schema: Vec<FeatureField>,
    pub model: ModelSpec,
}

/// An immutable, servable model version.
#[derive(Debug)]
pub struct ModelArtifact {
    pub name: String,
    pub version: String,
    /// Producer asked for this version to be the active one.
    pub active: bool,
    pub description: Option<String>,
    pub schema: FeatureSchema,
    pub family: ModelFamily,
    pub source: PathBuf,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModelKey {
    pub name: String,
    pub version: String,
}

impl std::fmt::Display for ModelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

fn check_identifier(what: &str, value: &str) -> Result<(), ArtifactError> {
    let ok = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(ArtifactError::invalid(format!("{what} '{value}' must be non-empty [A-Za-z0-9_.-]")))
    }
}

impl ModelArtifact {
    pub fn from_json(bytes: &[u8], source: &Path) -> Result<Self, ArtifactError> {
        // Peek at the format version first so newer files fail with a clear error
        // instead of a field mismatch.
        #[derive(Deserialize)]
        struct Header {
            format_version: u32,
        }
        let header: Header = serde_json::from_slice(bytes)?;
        if header.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedFormat(header.format_version));
        }

        let file: ArtifactFile = serde_json::from_slice(bytes)?;
        Self::from_file(file, source)
    }

    pub fn from_file(file: ArtifactFile, source: &Path) -> Result<Self, ArtifactError> {
        check_identifier("name", &file.name)?;
        check_identifier("version", &file.version)?;
        let schema = FeatureSchema::new(file.schema)?;
        let family = ModelFamily::compile(file.model, &schema)?;

        Ok(Self {
            name: file.name,
            version: file.version,
            active: file.active,
            description: file.description,
            schema,
            family,
            source: source.to_path_buf(),
            loaded_at: Utc::now(),
        })
    }

    pub fn read(path: &Path) -> Result<Self, ArtifactError> {
        let bytes = fs::read(path)?;
        Self::from_json(&bytes, path)
    }

    pub fn key(&self) -> ModelKey {
        ModelKey {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}
