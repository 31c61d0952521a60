//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`. Error bodies are JSON:
//!
//! ```json
//! {"code": "AlreadyExists", "message": "...", "fields": [{"field": "email", "message": "..."}]}
//! ```
//!
//! `fields` is only present for validation failures.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::ProvisioningError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Registration failed.
    #[error("Provisioning error: {0}")]
    Provisioning(#[from] ProvisioningError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Well-formed request with invalid content.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

/// A single invalid request field.
#[derive(Debug, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl AppError {
    /// HTTP status and machine-readable code for this error.
    #[must_use]
    pub const fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Provisioning(ProvisioningError::AlreadyExists) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "AlreadyExists")
            }
            Self::Provisioning(ProvisioningError::InvalidRequest { .. }) | Self::Validation(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "ValidationError")
            }
            Self::Provisioning(ProvisioningError::Upstream(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "UpstreamProviderError")
            }
            Self::Provisioning(ProvisioningError::Persistence { .. }) | Self::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PersistenceError")
            }
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
        }
    }

    fn body(&self, code: &'static str) -> ErrorBody {
        // Don't expose internal error details to clients
        let (message, fields) = match self {
            Self::Provisioning(ProvisioningError::AlreadyExists) => (
                "An account with this email or phone already exists".to_string(),
                Vec::new(),
            ),
            Self::Provisioning(ProvisioningError::InvalidRequest { field, message }) => (
                "Validation failed".to_string(),
                vec![FieldError {
                    field,
                    message: message.clone(),
                }],
            ),
            Self::Provisioning(ProvisioningError::Upstream(_)) => {
                ("Identity provider error".to_string(), Vec::new())
            }
            Self::Provisioning(ProvisioningError::Persistence { .. }) | Self::Database(_) => {
                ("Internal server error".to_string(), Vec::new())
            }
            Self::BadRequest(message) | Self::Validation(message) => (message.clone(), Vec::new()),
        };

        ErrorBody {
            code,
            message,
            fields,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                code,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(self.body(code))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
