//! # Service Information & Endpoint API
//!
//! Endpoints are saved one at a time; the service information and process
//! around them are created on demand. Processes and document types are
//! deleted explicitly once they are empty.
//!
//! Bulk rewrites replace a certificate or URL in every endpoint that uses
//! it, optionally limited to one service group.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use smp_registry::outcome::SaveMode;
use smp_registry::service_info::{
    BulkChangeReport, EndpointInput, ResolvedEndpoint, ServiceInformation,
};
use utoipa::ToSchema;

use crate::auth::{require_group_access, require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{
    existing_service_group, extract_json, parse_document_type, parse_participant, parse_process,
};
use crate::routes::{deleted, ChangeResponse};
use crate::state::AppState;

/// Bulk replacement request.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkChangeRequest {
    /// Value to replace, compared by exact string equality.
    pub old_value: String,
    /// Replacement.
    pub new_value: String,
    /// Limit the change to this service group.
    #[serde(default)]
    pub service_group_id: Option<String>,
}

/// Build the service information and endpoint router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/service-groups/:participant/service-information",
            get(list_service_information),
        )
        .route(
            "/v1/service-groups/:participant/service-information/:doctype",
            get(get_service_information).delete(delete_service_information),
        )
        .route(
            "/v1/service-groups/:participant/service-information/:doctype/processes/:process",
            delete(delete_process),
        )
        .route("/v1/endpoints", post(create_endpoint).put(edit_endpoint))
        .route(
            "/v1/endpoints/:participant/:doctype/:process/:transport_profile",
            get(get_endpoint).delete(delete_endpoint),
        )
        .route("/v1/bulk/change-certificate", post(change_certificate))
        .route("/v1/bulk/change-url", post(change_url))
}

/// Check write access to the service group named in a request body.
///
/// An unparsable or unknown service group is left to registry validation,
/// which reports it as a field error.
pub(crate) fn require_input_group_access(
    state: &AppState,
    caller: &CallerIdentity,
    raw_service_group: &str,
) -> Result<(), AppError> {
    require_role(caller, Role::Owner)?;
    let group = state
        .registry
        .policy()
        .parse_participant(raw_service_group)
        .ok()
        .and_then(|p| state.registry.service_groups().get(&p));
    match group {
        Some(group) => require_group_access(caller, &group),
        None => Ok(()),
    }
}

// ── Service information ─────────────────────────────────────────────────────

/// GET /v1/service-groups/:participant/service-information
#[utoipa::path(
    get,
    path = "/v1/service-groups/{participant}/service-information",
    params(("participant" = String, Path, description = "Participant identifier")),
    responses(
        (status = 200, description = "Service information of the group", body = Vec<serde_json::Value>),
        (status = 404, description = "Service group not found", body = crate::error::ErrorBody),
    ),
    tag = "service-information"
)]
pub(crate) async fn list_service_information(
    State(state): State<AppState>,
    Path(participant): Path<String>,
) -> Result<Json<Vec<ServiceInformation>>, AppError> {
    let participant = parse_participant(&state, &participant)?;
    existing_service_group(&state, &participant)?;
    Ok(Json(
        state
            .registry
            .service_information()
            .get_all_of_service_group(&participant),
    ))
}

/// GET /v1/service-groups/:participant/service-information/:doctype
#[utoipa::path(
    get,
    path = "/v1/service-groups/{participant}/service-information/{doctype}",
    params(
        ("participant" = String, Path, description = "Participant identifier"),
        ("doctype" = String, Path, description = "Document type identifier"),
    ),
    responses(
        (status = 200, description = "Service information", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "service-information"
)]
pub(crate) async fn get_service_information(
    State(state): State<AppState>,
    Path((participant, doctype)): Path<(String, String)>,
) -> Result<Json<ServiceInformation>, AppError> {
    let participant = parse_participant(&state, &participant)?;
    let doctype = parse_document_type(&state, &doctype)?;
    state
        .registry
        .service_information()
        .find_service_information(&participant, &doctype)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("document type '{doctype}' of '{participant}'")))
}

/// DELETE /v1/service-groups/:participant/service-information/:doctype
///
/// Rejected with 409 while processes remain.
#[utoipa::path(
    delete,
    path = "/v1/service-groups/{participant}/service-information/{doctype}",
    params(
        ("participant" = String, Path, description = "Participant identifier"),
        ("doctype" = String, Path, description = "Document type identifier"),
    ),
    responses(
        (status = 200, description = "Deleted", body = ChangeResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Processes remain", body = crate::error::ErrorBody),
    ),
    tag = "service-information"
)]
pub(crate) async fn delete_service_information(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((participant, doctype)): Path<(String, String)>,
) -> Result<Json<ChangeResponse>, AppError> {
    let participant = parse_participant(&state, &participant)?;
    let doctype = parse_document_type(&state, &doctype)?;
    require_group_access(&caller, &existing_service_group(&state, &participant)?)?;

    let change = state.registry.service_information().delete_service_information(
        caller.actor(),
        &participant,
        &doctype,
    )?;
    deleted(change, || format!("document type '{doctype}' of '{participant}'")).map(Json)
}

/// DELETE /v1/service-groups/:participant/service-information/:doctype/processes/:process
///
/// Rejected with 409 while endpoints remain.
#[utoipa::path(
    delete,
    path = "/v1/service-groups/{participant}/service-information/{doctype}/processes/{process}",
    params(
        ("participant" = String, Path, description = "Participant identifier"),
        ("doctype" = String, Path, description = "Document type identifier"),
        ("process" = String, Path, description = "Process identifier"),
    ),
    responses(
        (status = 200, description = "Deleted", body = ChangeResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Endpoints remain", body = crate::error::ErrorBody),
    ),
    tag = "service-information"
)]
pub(crate) async fn delete_process(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((participant, doctype, process)): Path<(String, String, String)>,
) -> Result<Json<ChangeResponse>, AppError> {
    let participant = parse_participant(&state, &participant)?;
    let doctype = parse_document_type(&state, &doctype)?;
    let process = parse_process(&state, &process)?;
    require_group_access(&caller, &existing_service_group(&state, &participant)?)?;

    let change = state.registry.service_information().delete_process(
        caller.actor(),
        &participant,
        &doctype,
        &process,
    )?;
    deleted(change, || format!("process '{process}' of '{doctype}'")).map(Json)
}

// ── Endpoints ───────────────────────────────────────────────────────────────

async fn save_endpoint(
    state: &AppState,
    caller: &CallerIdentity,
    body: Result<Json<EndpointInput>, JsonRejection>,
    mode: SaveMode,
) -> Result<ResolvedEndpoint, AppError> {
    let input = extract_json(body)?;
    require_input_group_access(state, caller, &input.service_group_id)?;
    Ok(state
        .registry
        .service_information()
        .save_endpoint(caller.actor(), &input, mode)?)
}

/// POST /v1/endpoints: Create an endpoint.
#[utoipa::path(
    post,
    path = "/v1/endpoints",
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Endpoint created", body = serde_json::Value),
        (status = 409, description = "Duplicate endpoint or redirect present", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid fields", body = crate::error::ErrorBody),
    ),
    tag = "endpoints"
)]
pub(crate) async fn create_endpoint(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<EndpointInput>, JsonRejection>,
) -> Result<(StatusCode, Json<ResolvedEndpoint>), AppError> {
    let resolved = save_endpoint(&state, &caller, body, SaveMode::Create).await?;
    Ok((StatusCode::CREATED, Json(resolved)))
}

/// PUT /v1/endpoints: Replace an existing endpoint.
#[utoipa::path(
    put,
    path = "/v1/endpoints",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Endpoint saved", body = serde_json::Value),
        (status = 404, description = "Endpoint not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid fields", body = crate::error::ErrorBody),
    ),
    tag = "endpoints"
)]
pub(crate) async fn edit_endpoint(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<EndpointInput>, JsonRejection>,
) -> Result<Json<ResolvedEndpoint>, AppError> {
    save_endpoint(&state, &caller, body, SaveMode::Edit)
        .await
        .map(Json)
}

/// GET /v1/endpoints/:participant/:doctype/:process/:transport_profile
#[utoipa::path(
    get,
    path = "/v1/endpoints/{participant}/{doctype}/{process}/{transport_profile}",
    params(
        ("participant" = String, Path, description = "Participant identifier"),
        ("doctype" = String, Path, description = "Document type identifier"),
        ("process" = String, Path, description = "Process identifier"),
        ("transport_profile" = String, Path, description = "Transport profile ID"),
    ),
    responses(
        (status = 200, description = "Endpoint with its service group, service information and process", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "endpoints"
)]
pub(crate) async fn get_endpoint(
    State(state): State<AppState>,
    Path((participant, doctype, process, transport_profile)): Path<(String, String, String, String)>,
) -> Result<Json<ResolvedEndpoint>, AppError> {
    let participant = parse_participant(&state, &participant)?;
    let doctype = parse_document_type(&state, &doctype)?;
    let process = parse_process(&state, &process)?;
    Ok(Json(state.registry.service_information().resolve_endpoint(
        &participant,
        &doctype,
        &process,
        &transport_profile,
    )?))
}

/// DELETE /v1/endpoints/:participant/:doctype/:process/:transport_profile
#[utoipa::path(
    delete,
    path = "/v1/endpoints/{participant}/{doctype}/{process}/{transport_profile}",
    params(
        ("participant" = String, Path, description = "Participant identifier"),
        ("doctype" = String, Path, description = "Document type identifier"),
        ("process" = String, Path, description = "Process identifier"),
        ("transport_profile" = String, Path, description = "Transport profile ID"),
    ),
    responses(
        (status = 200, description = "Deleted", body = ChangeResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "endpoints"
)]
pub(crate) async fn delete_endpoint(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((participant, doctype, process, transport_profile)): Path<(String, String, String, String)>,
) -> Result<Json<ChangeResponse>, AppError> {
    let participant = parse_participant(&state, &participant)?;
    let doctype = parse_document_type(&state, &doctype)?;
    let process = parse_process(&state, &process)?;
    require_group_access(&caller, &existing_service_group(&state, &participant)?)?;

    let change = state.registry.service_information().delete_endpoint(
        caller.actor(),
        &participant,
        &doctype,
        &process,
        &transport_profile,
    )?;
    deleted(change, || format!("endpoint '{transport_profile}' of '{process}'")).map(Json)
}

// ── Bulk changes ────────────────────────────────────────────────────────────

/// Resolve the scope of a bulk change. Owners must name a group they own.
fn bulk_scope(
    state: &AppState,
    caller: &CallerIdentity,
    raw: Option<&str>,
) -> Result<Option<smp_core::ParticipantId>, AppError> {
    require_role(caller, Role::Owner)?;
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let participant = parse_participant(state, raw)?;
            require_group_access(caller, &existing_service_group(state, &participant)?)?;
            Ok(Some(participant))
        }
        None if caller.has_role(Role::Administrator) => Ok(None),
        None => Err(AppError::Forbidden(
            "owners must limit bulk changes to one of their service groups".to_string(),
        )),
    }
}

/// POST /v1/bulk/change-certificate: Replace a certificate everywhere.
#[utoipa::path(
    post,
    path = "/v1/bulk/change-certificate",
    request_body = BulkChangeRequest,
    responses(
        (status = 200, description = "Change report", body = serde_json::Value),
        (status = 422, description = "Invalid certificates", body = crate::error::ErrorBody),
    ),
    tag = "bulk"
)]
pub(crate) async fn change_certificate(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<BulkChangeRequest>, JsonRejection>,
) -> Result<Json<BulkChangeReport>, AppError> {
    let req = extract_json(body)?;
    let scope = bulk_scope(&state, &caller, req.service_group_id.as_deref())?;
    Ok(Json(
        state.registry.service_information().change_certificate_everywhere(
            caller.actor(),
            &req.old_value,
            &req.new_value,
            scope.as_ref(),
        )?,
    ))
}

/// POST /v1/bulk/change-url: Replace an endpoint URL everywhere.
#[utoipa::path(
    post,
    path = "/v1/bulk/change-url",
    request_body = BulkChangeRequest,
    responses(
        (status = 200, description = "Change report", body = serde_json::Value),
        (status = 422, description = "Invalid URLs", body = crate::error::ErrorBody),
    ),
    tag = "bulk"
)]
pub(crate) async fn change_url(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<BulkChangeRequest>, JsonRejection>,
) -> Result<Json<BulkChangeReport>, AppError> {
    let req = extract_json(body)?;
    let scope = bulk_scope(&state, &caller, req.service_group_id.as_deref())?;
    Ok(Json(state.registry.service_information().change_url_everywhere(
        caller.actor(),
        &req.old_value,
        &req.new_value,
        scope.as_ref(),
    )?))
}
