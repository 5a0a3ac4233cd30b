//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps registry, exchange and validation errors to HTTP status codes and
//! JSON bodies of the form `{"error": {"code", "message", "details"?}}`.
//! Internal error details are never returned to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use smp_core::{FieldErrors, ValidationError};
use smp_registry::exchange::ExchangeError;
use smp_registry::RegistryError;
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Field errors for 422, the conflicting field for 409, the remote
    /// failure for 502. Never present on 500.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// One or more input fields are invalid (422).
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// Request body or path could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions, or REST writes are disabled (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current state (409).
    #[error("{message}")]
    Conflict {
        /// Field the conflict is attributed to.
        field: Option<String>,
        /// Human-readable description.
        message: String,
    },

    /// A remote SML or Directory call failed (502).
    #[error("{operation} failed: {message}")]
    RemoteSync {
        /// Remote operation name.
        operation: String,
        /// Technical class of the failure.
        kind: String,
        /// Technical message.
        message: String,
    },

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Conflict without a field.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            field: None,
            message: message.into(),
        }
    }

    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
            Self::RemoteSync { .. } => (StatusCode::BAD_GATEWAY, "REMOTE_SYNC_ERROR"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation(errors) => serde_json::to_value(errors).ok(),
            Self::Conflict {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            Self::RemoteSync {
                operation,
                kind,
                message,
            } => Some(serde_json::json!({
                "operation": operation,
                "kind": kind,
                "message": message,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::Validation(_) => "The request contains invalid fields".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::RemoteSync { .. } => tracing::warn!(error = %self, "remote sync failed"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Invalid(errors) => Self::Validation(errors),
            RegistryError::Conflict { field, message } => Self::Conflict { field, message },
            RegistryError::NotFound(what) => Self::NotFound(what),
            RegistryError::RemoteSync { operation, source } => Self::RemoteSync {
                operation: operation.to_string(),
                kind: source.kind,
                message: source.message,
            },
            RegistryError::InvalidState(message) => Self::conflict(message),
            RegistryError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        RegistryError::from(err).into()
    }
}

impl From<ExchangeError> for AppError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Parse(_)
            | ExchangeError::UnsupportedVersion(_)
            | ExchangeError::Format(_) => Self::BadRequest(err.to_string()),
            ExchangeError::Xml(_) | ExchangeError::Io(_) | ExchangeError::Utf8(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use smp_registry::hooks::HookError;
    use smp_registry::StoreError;

    async fn response_parts(err: AppError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        (status, body)
    }

    #[tokio::test]
    async fn validation_lists_every_field() {
        let mut errors = FieldErrors::new();
        errors.add("certificate", "The certificate must not be empty!");
        errors.add("serviceDescription", "The service description must not be empty!");
        let (status, body) = response_parts(AppError::Validation(errors)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.error.code, "VALIDATION_ERROR");
        let details = body.error.details.unwrap();
        let details = details.as_array().unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details[0]["field"], "certificate");
        assert_eq!(details[1]["field"], "serviceDescription");
    }

    #[tokio::test]
    async fn conflict_carries_field() {
        let err: AppError =
            RegistryError::conflict("participantId", "Another service group exists").into();
        let (status, body) = response_parts(err).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.error.details.unwrap()["field"], "participantId");
    }

    #[tokio::test]
    async fn remote_sync_is_bad_gateway_with_kind() {
        let err: AppError = RegistryError::RemoteSync {
            operation: "create_participant",
            source: HookError::new("UnauthorizedFault", "certificate rejected"),
        }
        .into();
        let (status, body) = response_parts(err).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.error.code, "REMOTE_SYNC_ERROR");
        let details = body.error.details.unwrap();
        assert_eq!(details["kind"], "UnauthorizedFault");
        assert_eq!(details["operation"], "create_participant");
    }

    #[tokio::test]
    async fn store_failure_hides_details() {
        let err: AppError = RegistryError::Store(StoreError::Persistence {
            collection: "service-groups",
            reason: "disk full".to_string(),
        })
        .into();
        let (status, body) = response_parts(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.message, "An internal error occurred");
        assert!(body.error.details.is_none());
    }

    #[tokio::test]
    async fn invalid_state_is_conflict_without_details() {
        let err: AppError =
            RegistryError::InvalidState("the SMP is not registered at the SML".into()).into();
        let (status, body) = response_parts(err).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.error.message.contains("not registered"));
        assert!(body.error.details.is_none());
    }

    #[test]
    fn unsupported_exchange_version_is_bad_request() {
        let err = AppError::from(ExchangeError::UnsupportedVersion("2.0".into()));
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("2.0")));
    }
}
