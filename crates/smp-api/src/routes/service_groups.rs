//! # Service Group API
//!
//! CRUD over service groups plus a DNS check of every participant against
//! the selected SML. Deleting a service group cascades to its service
//! information, redirects and business card.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use smp_client::ParticipantDnsReport;
use smp_registry::service_group::{ServiceGroup, ServiceGroupInput};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{require_group_access, require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{existing_service_group, extract_json, parse_participant};
use crate::routes::{deleted, ChangeResponse};
use crate::state::AppState;

/// Request to create a service group.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceGroupRequest {
    /// Participant identifier as `scheme::value`.
    pub participant_id: String,
    /// Owning user. Defaults to the caller; owners can only create groups
    /// for themselves.
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Optional XML extension.
    #[serde(default)]
    pub extension: Option<String>,
}

/// Request to update a service group.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateServiceGroupRequest {
    /// New owner. Omitted keeps the current owner.
    #[serde(default)]
    pub owner_id: Option<String>,
    /// New XML extension. Omitted or empty removes it.
    #[serde(default)]
    pub extension: Option<String>,
}

/// List filter.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListServiceGroupsQuery {
    /// Only groups of this owner.
    pub owner: Option<String>,
}

/// Service group list.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceGroupList {
    pub count: usize,
    #[schema(value_type = Vec<Object>)]
    pub service_groups: Vec<ServiceGroup>,
}

/// Build the service group router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/service-groups",
            get(list_service_groups).post(create_service_group),
        )
        .route("/v1/service-groups/checkdns", get(check_dns))
        .route(
            "/v1/service-groups/:participant",
            get(get_service_group)
                .put(update_service_group)
                .delete(delete_service_group),
        )
}

/// GET /v1/service-groups: List service groups.
#[utoipa::path(
    get,
    path = "/v1/service-groups",
    params(ListServiceGroupsQuery),
    responses(
        (status = 200, description = "Service groups", body = ServiceGroupList),
    ),
    tag = "service-groups"
)]
pub(crate) async fn list_service_groups(
    State(state): State<AppState>,
    Query(query): Query<ListServiceGroupsQuery>,
) -> Json<ServiceGroupList> {
    let registry = state.registry.service_groups();
    let service_groups = match query.owner.as_deref() {
        Some(owner) => registry.get_all_of_owner(owner),
        None => registry.get_all(),
    };
    Json(ServiceGroupList {
        count: service_groups.len(),
        service_groups,
    })
}

/// POST /v1/service-groups: Create a service group.
///
/// With SML integration active the participant is registered at the SML
/// first; if that fails nothing is stored.
#[utoipa::path(
    post,
    path = "/v1/service-groups",
    request_body = CreateServiceGroupRequest,
    responses(
        (status = 201, description = "Service group created", body = serde_json::Value),
        (status = 409, description = "Participant already exists", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 502, description = "SML registration failed", body = crate::error::ErrorBody),
    ),
    tag = "service-groups"
)]
pub(crate) async fn create_service_group(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateServiceGroupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ServiceGroup>), AppError> {
    require_role(&caller, Role::Owner)?;
    let req = extract_json(body)?;

    let owner_id = match (caller.role, req.owner_id) {
        (Role::Administrator, Some(owner)) if !owner.trim().is_empty() => owner,
        (Role::Administrator, _) => caller.user_id.clone(),
        (_, Some(owner)) if owner != caller.user_id => {
            return Err(AppError::Forbidden(
                "owners can only create service groups for themselves".to_string(),
            ))
        }
        _ => caller.user_id.clone(),
    };

    let input = ServiceGroupInput {
        participant_id: req.participant_id,
        owner_id,
        extension: req.extension,
    };
    let group = state
        .registry
        .service_groups()
        .create(caller.actor(), &input)
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// GET /v1/service-groups/:participant: Get one service group.
#[utoipa::path(
    get,
    path = "/v1/service-groups/{participant}",
    params(("participant" = String, Path, description = "Participant identifier")),
    responses(
        (status = 200, description = "Service group", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "service-groups"
)]
pub(crate) async fn get_service_group(
    State(state): State<AppState>,
    Path(participant): Path<String>,
) -> Result<Json<ServiceGroup>, AppError> {
    let participant = parse_participant(&state, &participant)?;
    existing_service_group(&state, &participant).map(Json)
}

/// PUT /v1/service-groups/:participant: Change owner or extension.
#[utoipa::path(
    put,
    path = "/v1/service-groups/{participant}",
    params(("participant" = String, Path, description = "Participant identifier")),
    request_body = UpdateServiceGroupRequest,
    responses(
        (status = 200, description = "Update result", body = ChangeResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "service-groups"
)]
pub(crate) async fn update_service_group(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(participant): Path<String>,
    body: Result<Json<UpdateServiceGroupRequest>, JsonRejection>,
) -> Result<Json<ChangeResponse>, AppError> {
    let participant = parse_participant(&state, &participant)?;
    let group = existing_service_group(&state, &participant)?;
    require_group_access(&caller, &group)?;
    let req = extract_json(body)?;

    let owner_id = req.owner_id.unwrap_or_else(|| group.owner_id.clone());
    if owner_id != group.owner_id && !caller.has_role(Role::Administrator) {
        return Err(AppError::Forbidden(
            "only administrators can transfer service groups".to_string(),
        ));
    }

    let change = state.registry.service_groups().update(
        caller.actor(),
        &participant,
        &owner_id,
        req.extension.as_deref(),
    )?;
    Ok(Json(change.into()))
}

/// DELETE /v1/service-groups/:participant: Delete a service group and
/// everything below it.
///
/// A failing SML deregistration does not stop the local delete; it is
/// reported in `warnings`.
#[utoipa::path(
    delete,
    path = "/v1/service-groups/{participant}",
    params(("participant" = String, Path, description = "Participant identifier")),
    responses(
        (status = 200, description = "Deleted", body = ChangeResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "service-groups"
)]
pub(crate) async fn delete_service_group(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(participant): Path<String>,
) -> Result<Json<ChangeResponse>, AppError> {
    let participant = parse_participant(&state, &participant)?;
    let group = existing_service_group(&state, &participant)?;
    require_group_access(&caller, &group)?;

    let outcome = state
        .registry
        .service_groups()
        .delete(caller.actor(), &participant)
        .await?;
    if !outcome.value.is_changed() {
        return deleted(outcome.value, || format!("service group '{participant}'")).map(Json);
    }
    Ok(Json(outcome.into()))
}

/// GET /v1/service-groups/checkdns: Check every participant in DNS.
#[utoipa::path(
    get,
    path = "/v1/service-groups/checkdns",
    responses(
        (status = 200, description = "DNS report", body = serde_json::Value),
        (status = 409, description = "No SML selected", body = crate::error::ErrorBody),
    ),
    tag = "service-groups"
)]
pub(crate) async fn check_dns(
    State(state): State<AppState>,
) -> Result<Json<ParticipantDnsReport>, AppError> {
    let sml = state
        .registry
        .settings()
        .selected_sml_info()
        .ok_or_else(|| AppError::conflict("no SML configuration is selected"))?;
    let participants: Vec<_> = state
        .registry
        .service_groups()
        .get_all()
        .into_iter()
        .map(|g| g.participant_id)
        .collect();
    Ok(Json(state.dns.check_participants(&participants, &sml).await))
}
