//! # Custom Extractors
//!
//! JSON body extraction with error mapping, and parsing of the URI-encoded
//! identifiers that appear in route paths.

use axum::extract::rejection::JsonRejection;
use axum::Json;
use smp_core::{DocumentTypeId, ParticipantId, ProcessId};
use smp_registry::service_group::ServiceGroup;

use crate::error::AppError;
use crate::state::AppState;

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
///
/// Handlers should use:
/// ```ignore
/// async fn handler(body: Result<Json<T>, JsonRejection>) -> Result<..., AppError> {
///     let req = extract_json(body)?;
///     // use req...
/// }
/// ```
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Parse a participant identifier taken from the path.
pub fn parse_participant(state: &AppState, raw: &str) -> Result<ParticipantId, AppError> {
    state
        .registry
        .policy()
        .parse_participant(raw)
        .map_err(|e| AppError::BadRequest(format!("participant '{raw}': {e}")))
}

/// Parse a document type identifier taken from the path.
pub fn parse_document_type(state: &AppState, raw: &str) -> Result<DocumentTypeId, AppError> {
    state
        .registry
        .policy()
        .parse_document_type(raw)
        .map_err(|e| AppError::BadRequest(format!("document type '{raw}': {e}")))
}

/// Parse a process identifier taken from the path.
pub fn parse_process(state: &AppState, raw: &str) -> Result<ProcessId, AppError> {
    state
        .registry
        .policy()
        .parse_process(raw)
        .map_err(|e| AppError::BadRequest(format!("process '{raw}': {e}")))
}

/// Look up the service group addressed by a path, 404 if absent.
pub fn existing_service_group(
    state: &AppState,
    participant: &ParticipantId,
) -> Result<ServiceGroup, AppError> {
    state
        .registry
        .service_groups()
        .get(participant)
        .ok_or_else(|| AppError::NotFound(format!("service group '{participant}'")))
}
