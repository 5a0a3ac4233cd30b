//! # SML API
//!
//! Registration of this SMP at the SML and the catalogue of SML
//! configurations. The registration follows a strict state machine:
//! `POST` needs an unregistered SMP, `PUT` and `DELETE` a registered one;
//! anything else is a 409. The local state only changes after the SML
//! accepted the call.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use smp_client::DnsStatus;
use smp_registry::sml_info::{SmlInfo, SmlInfoInput};
use smp_registry::sml_registration::SmlRegistration;
use utoipa::ToSchema;

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::routes::{deleted, ChangeResponse};
use crate::state::AppState;

/// Addresses to register at the SML.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SmlRegistrationRequest {
    /// Dotted IPv4 address.
    pub physical_address: String,
    /// `http` URL of this SMP, port 80, no path.
    pub logical_address: String,
    /// SML to register at. Defaults to the SML selected in the settings.
    /// Ignored on update.
    #[serde(default)]
    pub sml_info_id: Option<String>,
}

/// Build the SML router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/sml/registration",
            get(get_registration)
                .post(register)
                .put(update_registration)
                .delete(unregister),
        )
        .route("/v1/sml/registration/checkdns", get(check_registration_dns))
        .route("/v1/sml-infos", get(list_sml_infos).post(create_sml_info))
        .route(
            "/v1/sml-infos/:id",
            get(get_sml_info).put(update_sml_info).delete(delete_sml_info),
        )
}

// ── Registration ────────────────────────────────────────────────────────────

/// GET /v1/sml/registration: Current registration state.
#[utoipa::path(
    get,
    path = "/v1/sml/registration",
    responses(
        (status = 200, description = "Registration state", body = serde_json::Value),
    ),
    tag = "sml"
)]
pub(crate) async fn get_registration(State(state): State<AppState>) -> Json<SmlRegistration> {
    Json(state.registry.sml_registration().state())
}

/// POST /v1/sml/registration: Register this SMP at the SML.
#[utoipa::path(
    post,
    path = "/v1/sml/registration",
    request_body = SmlRegistrationRequest,
    responses(
        (status = 201, description = "Registered", body = serde_json::Value),
        (status = 409, description = "Already registered or no SMP ID configured", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid addresses", body = crate::error::ErrorBody),
        (status = 502, description = "SML rejected the registration", body = crate::error::ErrorBody),
    ),
    tag = "sml"
)]
pub(crate) async fn register(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<SmlRegistrationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SmlRegistration>), AppError> {
    require_role(&caller, Role::Administrator)?;
    let req = extract_json(body)?;
    let smp_id = state
        .sml
        .smp_id()
        .ok_or_else(|| AppError::conflict("no SMP ID is configured"))?;

    let registration = state
        .registry
        .sml_registration()
        .register(
            caller.actor(),
            smp_id,
            &req.physical_address,
            &req.logical_address,
            req.sml_info_id.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// PUT /v1/sml/registration: Update the registered addresses.
#[utoipa::path(
    put,
    path = "/v1/sml/registration",
    request_body = SmlRegistrationRequest,
    responses(
        (status = 200, description = "Updated", body = serde_json::Value),
        (status = 409, description = "Not registered", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid addresses", body = crate::error::ErrorBody),
        (status = 502, description = "SML rejected the update", body = crate::error::ErrorBody),
    ),
    tag = "sml"
)]
pub(crate) async fn update_registration(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<SmlRegistrationRequest>, JsonRejection>,
) -> Result<Json<SmlRegistration>, AppError> {
    require_role(&caller, Role::Administrator)?;
    let req = extract_json(body)?;
    let registration = state
        .registry
        .sml_registration()
        .update(caller.actor(), &req.physical_address, &req.logical_address)
        .await?;
    Ok(Json(registration))
}

/// DELETE /v1/sml/registration: Remove this SMP from the SML.
#[utoipa::path(
    delete,
    path = "/v1/sml/registration",
    responses(
        (status = 200, description = "Unregistered", body = serde_json::Value),
        (status = 409, description = "Not registered", body = crate::error::ErrorBody),
        (status = 502, description = "SML rejected the deletion", body = crate::error::ErrorBody),
    ),
    tag = "sml"
)]
pub(crate) async fn unregister(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<SmlRegistration>, AppError> {
    require_role(&caller, Role::Administrator)?;
    let registration = state
        .registry
        .sml_registration()
        .unregister(caller.actor())
        .await?;
    Ok(Json(registration))
}

/// GET /v1/sml/registration/checkdns: Resolve this SMP's DNS name.
///
/// Uses the SML the SMP is registered at, or the selected SML when it is
/// not registered.
#[utoipa::path(
    get,
    path = "/v1/sml/registration/checkdns",
    responses(
        (status = 200, description = "DNS status", body = serde_json::Value),
        (status = 409, description = "No SMP ID or no SML", body = crate::error::ErrorBody),
    ),
    tag = "sml"
)]
pub(crate) async fn check_registration_dns(
    State(state): State<AppState>,
) -> Result<Json<DnsStatus>, AppError> {
    let (smp_id, sml) = match state.registry.sml_registration().state() {
        SmlRegistration::Registered {
            smp_id,
            sml_info_id,
            ..
        } => (Some(smp_id), state.registry.sml_infos().get(&sml_info_id)),
        SmlRegistration::NotRegistered => (
            state.sml.smp_id().map(str::to_string),
            state.registry.settings().selected_sml_info(),
        ),
    };
    let smp_id = smp_id.ok_or_else(|| AppError::conflict("no SMP ID is configured"))?;
    let sml = sml.ok_or_else(|| AppError::conflict("no SML configuration is selected"))?;
    Ok(Json(state.dns.check_smp(&smp_id, &sml).await))
}

// ── SML configurations ──────────────────────────────────────────────────────

/// GET /v1/sml-infos: List SML configurations.
#[utoipa::path(
    get,
    path = "/v1/sml-infos",
    responses(
        (status = 200, description = "SML configurations", body = Vec<serde_json::Value>),
    ),
    tag = "sml"
)]
pub(crate) async fn list_sml_infos(State(state): State<AppState>) -> Json<Vec<SmlInfo>> {
    Json(state.registry.sml_infos().get_all())
}

/// POST /v1/sml-infos: Add an SML configuration.
#[utoipa::path(
    post,
    path = "/v1/sml-infos",
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Created", body = serde_json::Value),
        (status = 422, description = "Invalid fields", body = crate::error::ErrorBody),
    ),
    tag = "sml"
)]
pub(crate) async fn create_sml_info(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<SmlInfoInput>, JsonRejection>,
) -> Result<(StatusCode, Json<SmlInfo>), AppError> {
    require_role(&caller, Role::Administrator)?;
    let input = extract_json(body)?;
    let info = state.registry.sml_infos().create(caller.actor(), &input)?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// GET /v1/sml-infos/:id
#[utoipa::path(
    get,
    path = "/v1/sml-infos/{id}",
    params(("id" = String, Path, description = "SML configuration ID")),
    responses(
        (status = 200, description = "SML configuration", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "sml"
)]
pub(crate) async fn get_sml_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SmlInfo>, AppError> {
    state
        .registry
        .sml_infos()
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("SML configuration '{id}'")))
}

/// PUT /v1/sml-infos/:id
#[utoipa::path(
    put,
    path = "/v1/sml-infos/{id}",
    params(("id" = String, Path, description = "SML configuration ID")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Update result", body = ChangeResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid fields", body = crate::error::ErrorBody),
    ),
    tag = "sml"
)]
pub(crate) async fn update_sml_info(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Result<Json<SmlInfoInput>, JsonRejection>,
) -> Result<Json<ChangeResponse>, AppError> {
    require_role(&caller, Role::Administrator)?;
    let input = extract_json(body)?;
    let change = state
        .registry
        .sml_infos()
        .update(caller.actor(), &id, &input)?;
    Ok(Json(change.into()))
}

/// DELETE /v1/sml-infos/:id
///
/// The SML selected in the settings cannot be deleted.
#[utoipa::path(
    delete,
    path = "/v1/sml-infos/{id}",
    params(("id" = String, Path, description = "SML configuration ID")),
    responses(
        (status = 200, description = "Deleted", body = ChangeResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Referenced by the settings", body = crate::error::ErrorBody),
    ),
    tag = "sml"
)]
pub(crate) async fn delete_sml_info(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<ChangeResponse>, AppError> {
    require_role(&caller, Role::Administrator)?;
    let change = state.registry.sml_infos().delete(caller.actor(), &id)?;
    deleted(change, || format!("SML configuration '{id}'")).map(Json)
}
