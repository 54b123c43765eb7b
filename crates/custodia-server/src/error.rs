//! Error types for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use custodia_core::WorkflowError;
use serde_json::json;
use thiserror::Error;

/// Errors returned by API handlers.
///
/// Every variant maps to a definite HTTP status code, and the JSON body
/// carries an enumerated error code plus a human-readable message. Denials
/// additionally carry their reason code so the client can explain the
/// failure without the core leaking internal state.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A core workflow operation failed.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Missing, malformed, or expired bearer token.
    #[error("unauthorized")]
    Unauthorized,
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    ///
    /// - `NotFound`: 404
    /// - `Conflict`, `InvalidState`, `OutOfOrderApproval`: 409
    /// - `Denied`: 403
    /// - `Validation`: 400
    /// - `StorageUnavailable`: 503 (retryable)
    /// - `Unauthorized`: 401
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Workflow(err) => match err {
                WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
                WorkflowError::Conflict { .. }
                | WorkflowError::InvalidState { .. }
                | WorkflowError::OutOfOrderApproval { .. } => StatusCode::CONFLICT,
                WorkflowError::Denied(_) => StatusCode::FORBIDDEN,
                WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
                WorkflowError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    /// Stable error code for the JSON body.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Workflow(err) => match err {
                WorkflowError::NotFound { .. } => "not_found",
                WorkflowError::Conflict { .. } => "conflict",
                WorkflowError::InvalidState { .. } => "invalid_state",
                WorkflowError::Denied(_) => "denied",
                WorkflowError::OutOfOrderApproval { .. } => "out_of_order_approval",
                WorkflowError::Validation(_) => "validation",
                WorkflowError::StorageUnavailable(_) => "storage_unavailable",
                _ => "internal",
            },
            Self::Unauthorized => "unauthorized",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Storage failures are logged server-side and surfaced opaquely;
        // everything else is caller error and safe to echo.
        let message = match &self {
            Self::Workflow(WorkflowError::StorageUnavailable(err)) => {
                tracing::error!(error = %err, "storage failure");
                "storage temporarily unavailable, retry".to_string()
            },
            other => other.to_string(),
        };

        let mut body = json!({
            "error": self.code(),
            "message": message,
        });
        if let Self::Workflow(WorkflowError::Denied(reason)) = &self {
            body["reason"] = json!(reason);
        }

        (status, Json(body)).into_response()
    }
}
