use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

pub type ServeResult<T> = Result<T, ServeError>;

/// A feature payload that does not conform to the model schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown feature field '{field}'")]
    UnknownField { field: String },

    #[error("missing required feature field '{field}'")]
    MissingField { field: String },

    #[error("feature field '{field}' expects {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl ValidationError {
    pub fn field(&self) -> &str {
        match self {
            Self::UnknownField { field }
            | Self::MissingField { field }
            | Self::TypeMismatch { field, .. } => field,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownField { .. } => "unknown_field",
            Self::MissingField { .. } => "missing_field",
            Self::TypeMismatch { .. } => "type_mismatch",
        }
    }
}

/// Why a single artifact file could not be turned into a servable model.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported format_version {0}")]
    UnsupportedFormat(u32),

    #[error("invalid artifact: {0}")]
    Invalid(String),

    #[error("duplicate artifact {name}@{version} (already loaded from {first})")]
    Duplicate {
        name: String,
        version: String,
        first: String,
    },
}

impl ArtifactError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("fatal startup failure: {0}")]
    StartupFatal(String),

    #[error("failed to load artifact {}: {source}", .path.display())]
    ArtifactLoad {
        path: PathBuf,
        #[source]
        source: ArtifactError,
    },

    #[error("model '{0}' not found")]
    NotFound(String),

    #[error("model '{name}' has no version '{version}'")]
    VersionNotFound { name: String, version: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("inference failed for {model}@{version}: {message}")]
    Inference {
        model: String,
        version: String,
        message: String,
    },

    #[error("inference did not finish within {0} ms")]
    Timeout(u64),

    #[error("service is starting, models are not loaded yet")]
    Starting,

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    DatasetMissing(String),

    #[error("reload failed: {0}")]
    ReloadFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServeError {
    /// Stable, documented identifier clients can branch on.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartupFatal(_) => "startup_fatal",
            Self::ArtifactLoad { .. } => "artifact_load_error",
            Self::NotFound(_) => "not_found",
            Self::VersionNotFound { .. } => "version_not_found",
            Self::Validation(_) => "validation_error",
            Self::BadRequest(_) => "bad_request",
            Self::Inference { .. } => "inference_error",
            Self::Timeout(_) => "timeout",
            Self::Starting => "starting",
            Self::Unavailable(_) => "unavailable",
            Self::DatasetMissing(_) => "dataset_missing",
            Self::ReloadFailed(_) => "reload_failed",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::VersionNotFound { .. } | Self::DatasetMissing(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Starting | Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::StartupFatal(_)
            | Self::ArtifactLoad { .. }
            | Self::Inference { .. }
            | Self::ReloadFailed(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "request rejected");
        }

        let (reason, field) = match &self {
            Self::Validation(v) => (Some(v.reason()), Some(v.field().to_string())),
            _ => (None, None),
        };
        let body = ErrorResponse {
            error: ErrorBody {
                kind: self.kind(),
                message: self.to_string(),
                reason,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}
