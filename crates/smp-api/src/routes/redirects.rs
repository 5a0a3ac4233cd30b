//! # Redirect API
//!
//! A redirect points a (service group, document type) at another SMP. It
//! cannot coexist with service information for the same document type.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use smp_registry::outcome::SaveMode;
use smp_registry::redirect::{Redirect, RedirectInput};

use crate::auth::{require_group_access, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{existing_service_group, extract_json, parse_document_type, parse_participant};
use crate::routes::service_info::require_input_group_access;
use crate::routes::{deleted, ChangeResponse};
use crate::state::AppState;

/// Build the redirect router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/redirects",
            get(list_redirects).post(create_redirect).put(edit_redirect),
        )
        .route(
            "/v1/redirects/:participant/:doctype",
            get(get_redirect).delete(delete_redirect),
        )
}

/// GET /v1/redirects: List all redirects.
#[utoipa::path(
    get,
    path = "/v1/redirects",
    responses(
        (status = 200, description = "Redirects", body = Vec<serde_json::Value>),
    ),
    tag = "redirects"
)]
pub(crate) async fn list_redirects(State(state): State<AppState>) -> Json<Vec<Redirect>> {
    Json(state.registry.redirects().get_all())
}

fn save(
    state: &AppState,
    caller: &CallerIdentity,
    body: Result<Json<RedirectInput>, JsonRejection>,
    mode: SaveMode,
) -> Result<Redirect, AppError> {
    let input = extract_json(body)?;
    require_input_group_access(state, caller, &input.service_group_id)?;
    Ok(state
        .registry
        .redirects()
        .create_or_update(caller.actor(), &input, mode)?)
}

/// POST /v1/redirects: Create a redirect.
#[utoipa::path(
    post,
    path = "/v1/redirects",
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Redirect created", body = serde_json::Value),
        (status = 409, description = "Redirect or endpoints already present", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid fields", body = crate::error::ErrorBody),
    ),
    tag = "redirects"
)]
pub(crate) async fn create_redirect(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<RedirectInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Redirect>), AppError> {
    let redirect = save(&state, &caller, body, SaveMode::Create)?;
    Ok((StatusCode::CREATED, Json(redirect)))
}

/// PUT /v1/redirects: Replace an existing redirect.
#[utoipa::path(
    put,
    path = "/v1/redirects",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Redirect saved", body = serde_json::Value),
        (status = 404, description = "Redirect not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid fields", body = crate::error::ErrorBody),
    ),
    tag = "redirects"
)]
pub(crate) async fn edit_redirect(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<RedirectInput>, JsonRejection>,
) -> Result<Json<Redirect>, AppError> {
    save(&state, &caller, body, SaveMode::Edit).map(Json)
}

/// GET /v1/redirects/:participant/:doctype
#[utoipa::path(
    get,
    path = "/v1/redirects/{participant}/{doctype}",
    params(
        ("participant" = String, Path, description = "Participant identifier"),
        ("doctype" = String, Path, description = "Document type identifier"),
    ),
    responses(
        (status = 200, description = "Redirect", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "redirects"
)]
pub(crate) async fn get_redirect(
    State(state): State<AppState>,
    Path((participant, doctype)): Path<(String, String)>,
) -> Result<Json<Redirect>, AppError> {
    let participant = parse_participant(&state, &participant)?;
    let doctype = parse_document_type(&state, &doctype)?;
    state
        .registry
        .redirects()
        .find(&participant, &doctype)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("redirect '{doctype}' of '{participant}'")))
}

/// DELETE /v1/redirects/:participant/:doctype
#[utoipa::path(
    delete,
    path = "/v1/redirects/{participant}/{doctype}",
    params(
        ("participant" = String, Path, description = "Participant identifier"),
        ("doctype" = String, Path, description = "Document type identifier"),
    ),
    responses(
        (status = 200, description = "Deleted", body = ChangeResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "redirects"
)]
pub(crate) async fn delete_redirect(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((participant, doctype)): Path<(String, String)>,
) -> Result<Json<ChangeResponse>, AppError> {
    let participant = parse_participant(&state, &participant)?;
    let doctype = parse_document_type(&state, &doctype)?;
    require_group_access(&caller, &existing_service_group(&state, &participant)?)?;

    let change = state
        .registry
        .redirects()
        .delete(caller.actor(), &participant, &doctype)?;
    deleted(change, || format!("redirect '{doctype}' of '{participant}'")).map(Json)
}
