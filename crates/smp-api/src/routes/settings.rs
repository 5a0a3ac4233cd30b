//! # Settings API
//!
//! The settings are a single persisted record. Changing the Directory
//! hostname re-points the Directory client immediately.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use smp_registry::settings::SmpSettings;

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::routes::ChangeResponse;
use crate::state::AppState;

/// Build the settings router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/settings", get(get_settings).put(update_settings))
}

/// GET /v1/settings
#[utoipa::path(
    get,
    path = "/v1/settings",
    responses(
        (status = 200, description = "Current settings", body = serde_json::Value),
    ),
    tag = "settings"
)]
pub(crate) async fn get_settings(State(state): State<AppState>) -> Json<SmpSettings> {
    Json(state.registry.settings().get())
}

/// PUT /v1/settings: Replace the settings.
///
/// Fields missing from the body take their default values.
#[utoipa::path(
    put,
    path = "/v1/settings",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Update result", body = ChangeResponse),
        (status = 403, description = "Administrator role required", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid settings", body = crate::error::ErrorBody),
    ),
    tag = "settings"
)]
pub(crate) async fn update_settings(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<SmpSettings>, JsonRejection>,
) -> Result<Json<ChangeResponse>, AppError> {
    require_role(&caller, Role::Administrator)?;
    let settings = extract_json(body)?;

    let registry = state.registry.settings();
    let previous_hostname = registry.get().directory_hostname;
    let change = registry.update(caller.actor(), settings)?;

    let hostname = registry.get().directory_hostname;
    if hostname != previous_hostname {
        state.directory.set_hostname(&hostname);
    }
    Ok(Json(change.into()))
}
