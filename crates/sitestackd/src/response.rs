//! Response bodies and error rendering

use crate::settings::ErrorMode;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sitestack_core::{ErrorKind, LifecycleError};
use thiserror::Error;

/// Successful dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Anything that can go wrong while handling a request
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The body is not a valid `ResourceSpec`
    #[error("{0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Decode(_) => ErrorKind::Validation,
            DispatchError::Lifecycle(e) => e.kind(),
        }
    }
}

/// Status code for an error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A [`DispatchError`] bound to the rendering mode of the daemon
#[derive(Debug)]
pub struct ApiError {
    error: DispatchError,
    mode: ErrorMode,
}

impl ApiError {
    pub fn new(error: impl Into<DispatchError>, mode: ErrorMode) -> Self {
        Self {
            error: error.into(),
            mode,
        }
    }

    pub fn error(&self) -> &DispatchError {
        &self.error
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.error.kind();
        let description = self.error.to_string();

        match kind {
            ErrorKind::Internal | ErrorKind::UpstreamUnavailable => {
                tracing::error!(%kind, "Request failed: {}", description)
            }
            _ => tracing::warn!(%kind, "Request rejected: {}", description),
        }

        match self.mode {
            ErrorMode::Tagged => (
                status_for(kind),
                Json(json!({ "error": description, "kind": kind })),
            )
                .into_response(),
            ErrorMode::Uniform => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": description })),
            )
                .into_response(),
        }
    }
}
