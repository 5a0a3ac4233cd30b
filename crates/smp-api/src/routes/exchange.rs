//! # Import / Export API
//!
//! Export renders the exchange XML (version 1.0) of all service groups or of
//! one owner. Import takes the same format as the request body and returns
//! the action log. An import with errors imports nothing; it still answers
//! 200 with `imported: false` so the log reaches the caller.

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use smp_registry::exchange::ImportSummary;
use utoipa::IntoParams;

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::state::AppState;

/// Export filter.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ExportQuery {
    /// Only service groups of this owner.
    pub owner: Option<String>,
}

/// Import options.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ImportQuery {
    /// Replace service groups that already exist.
    #[serde(default)]
    pub overwrite: bool,
    /// Owner for service groups whose owner is unknown.
    pub default_owner: Option<String>,
}

/// Build the exchange router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/export", get(export))
        .route("/v1/import", post(import))
}

/// GET /v1/export: Export service groups as XML.
#[utoipa::path(
    get,
    path = "/v1/export",
    params(ExportQuery),
    responses(
        (status = 200, description = "Exchange XML", content_type = "application/xml", body = String),
    ),
    tag = "exchange"
)]
pub(crate) async fn export(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let exchange = state.registry.exchange();
    let xml = match query.owner.as_deref() {
        Some(owner) => exchange.export_of_owner(owner)?,
        None => exchange.export_all()?,
    };
    Ok(([(header::CONTENT_TYPE, "application/xml")], xml))
}

/// POST /v1/import: Import service groups from XML.
#[utoipa::path(
    post,
    path = "/v1/import",
    params(ImportQuery),
    request_body(content = String, content_type = "application/xml"),
    responses(
        (status = 200, description = "Import log", body = serde_json::Value),
        (status = 400, description = "Not a version 1.0 exchange document", body = crate::error::ErrorBody),
        (status = 403, description = "Administrator role required", body = crate::error::ErrorBody),
    ),
    tag = "exchange"
)]
pub(crate) async fn import(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<ImportQuery>,
    body: String,
) -> Result<Json<ImportSummary>, AppError> {
    require_role(&caller, Role::Administrator)?;
    let options = state.import_options(query.overwrite, query.default_owner);
    let summary = state
        .registry
        .exchange()
        .import_xml(caller.actor(), &body, &options)
        .await?;
    Ok(Json(summary))
}
