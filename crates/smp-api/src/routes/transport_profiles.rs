//! # Transport Profile API

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use smp_registry::transport_profile::TransportProfile;
use utoipa::ToSchema;

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::routes::{deleted, ChangeResponse};
use crate::state::AppState;

/// New transport profile.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTransportProfileRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub deprecated: bool,
}

/// Changed name or deprecation flag.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTransportProfileRequest {
    pub name: String,
    #[serde(default)]
    pub deprecated: bool,
}

/// Build the transport profile router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/transport-profiles",
            get(list_transport_profiles).post(create_transport_profile),
        )
        .route(
            "/v1/transport-profiles/:id",
            get(get_transport_profile)
                .put(update_transport_profile)
                .delete(delete_transport_profile),
        )
}

/// GET /v1/transport-profiles
#[utoipa::path(
    get,
    path = "/v1/transport-profiles",
    responses(
        (status = 200, description = "Transport profiles", body = Vec<serde_json::Value>),
    ),
    tag = "transport-profiles"
)]
pub(crate) async fn list_transport_profiles(
    State(state): State<AppState>,
) -> Json<Vec<TransportProfile>> {
    Json(state.registry.transport_profiles().get_all())
}

/// POST /v1/transport-profiles
#[utoipa::path(
    post,
    path = "/v1/transport-profiles",
    request_body = CreateTransportProfileRequest,
    responses(
        (status = 201, description = "Created", body = serde_json::Value),
        (status = 409, description = "ID already used", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid fields", body = crate::error::ErrorBody),
    ),
    tag = "transport-profiles"
)]
pub(crate) async fn create_transport_profile(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateTransportProfileRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TransportProfile>), AppError> {
    require_role(&caller, Role::Administrator)?;
    let req = extract_json(body)?;
    let profile = state.registry.transport_profiles().create(
        caller.actor(),
        TransportProfile {
            id: req.id,
            name: req.name,
            deprecated: req.deprecated,
        },
    )?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// GET /v1/transport-profiles/:id
#[utoipa::path(
    get,
    path = "/v1/transport-profiles/{id}",
    params(("id" = String, Path, description = "Transport profile ID")),
    responses(
        (status = 200, description = "Transport profile", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "transport-profiles"
)]
pub(crate) async fn get_transport_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TransportProfile>, AppError> {
    state
        .registry
        .transport_profiles()
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("transport profile '{id}'")))
}

/// PUT /v1/transport-profiles/:id
#[utoipa::path(
    put,
    path = "/v1/transport-profiles/{id}",
    params(("id" = String, Path, description = "Transport profile ID")),
    request_body = UpdateTransportProfileRequest,
    responses(
        (status = 200, description = "Update result", body = ChangeResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "transport-profiles"
)]
pub(crate) async fn update_transport_profile(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Result<Json<UpdateTransportProfileRequest>, JsonRejection>,
) -> Result<Json<ChangeResponse>, AppError> {
    require_role(&caller, Role::Administrator)?;
    let req = extract_json(body)?;
    let change = state.registry.transport_profiles().update(
        caller.actor(),
        &id,
        &req.name,
        req.deprecated,
    )?;
    Ok(Json(change.into()))
}

/// DELETE /v1/transport-profiles/:id
///
/// Profiles still used by an endpoint cannot be deleted.
#[utoipa::path(
    delete,
    path = "/v1/transport-profiles/{id}",
    params(("id" = String, Path, description = "Transport profile ID")),
    responses(
        (status = 200, description = "Deleted", body = ChangeResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Profile in use", body = crate::error::ErrorBody),
    ),
    tag = "transport-profiles"
)]
pub(crate) async fn delete_transport_profile(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<ChangeResponse>, AppError> {
    require_role(&caller, Role::Administrator)?;
    let change = state
        .registry
        .transport_profiles()
        .delete(caller.actor(), &id)?;
    deleted(change, || format!("transport profile '{id}'")).map(Json)
}
