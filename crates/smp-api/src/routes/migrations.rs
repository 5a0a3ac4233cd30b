//! # Participant Migration API
//!
//! Moving participants between SMPs through the SML. The source SMP starts
//! an outbound migration and hands the returned key to the target SMP,
//! which posts it as an inbound migration. Once the target confirmed, the
//! source finalizes (deleting its service group) or cancels.
//!
//! Outbound migrations need access to the service group; inbound ones
//! follow the ownership rules of service group creation. Deleting a
//! migration record is reserved to administrators.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use smp_registry::migration::{
    InboundMigration, InboundMigrationInput, MigrationState, ParticipantMigration,
};
use smp_registry::Outcome;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{require_group_access, require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{existing_service_group, extract_json};
use crate::routes::{deleted, ChangeResponse};
use crate::state::AppState;

/// Request to start an outbound migration.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartMigrationRequest {
    /// Participant identifier as `scheme::value`.
    pub participant_id: String,
}

/// Request to accept a participant from another SMP.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InboundMigrationRequest {
    /// Participant identifier as `scheme::value`.
    pub participant_id: String,
    /// Key received from the source SMP.
    pub migration_key: String,
    /// Owner of the new service group. Defaults to the caller.
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Optional XML extension of the new service group.
    #[serde(default)]
    pub extension: Option<String>,
}

/// List filter.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListMigrationsQuery {
    /// Only migrations in this state: `in_progress`, `migrated` or `cancelled`.
    #[param(value_type = Option<String>)]
    pub state: Option<MigrationState>,
}

/// Migration list.
#[derive(Debug, Serialize, ToSchema)]
pub struct MigrationList {
    pub count: usize,
    #[schema(value_type = Vec<Object>)]
    pub migrations: Vec<ParticipantMigration>,
}

impl From<Vec<ParticipantMigration>> for MigrationList {
    fn from(migrations: Vec<ParticipantMigration>) -> Self {
        Self {
            count: migrations.len(),
            migrations,
        }
    }
}

/// Build the migration router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/migrations/outbound",
            get(list_outbound).post(start_outbound),
        )
        .route("/v1/migrations/outbound/export", get(export_outbound))
        .route("/v1/migrations/outbound/:id/cancel", post(cancel_outbound))
        .route("/v1/migrations/outbound/:id/finalize", post(finalize_outbound))
        .route(
            "/v1/migrations/inbound",
            get(list_inbound).post(migrate_inbound),
        )
        .route(
            "/v1/migrations/:id",
            get(get_migration).delete(delete_migration),
        )
}

/// Outbound migration addressed by a path, checked against the caller.
fn accessible_outbound(
    state: &AppState,
    caller: &CallerIdentity,
    id: &str,
) -> Result<ParticipantMigration, AppError> {
    let migration = state
        .registry
        .participant_migrations()
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("participant migration '{id}'")))?;
    match state.registry.service_groups().get(&migration.participant_id) {
        Some(group) => require_group_access(caller, &group)?,
        None => require_role(caller, Role::Administrator)?,
    }
    Ok(migration)
}

// ── Outbound ────────────────────────────────────────────────────────────────

/// GET /v1/migrations/outbound: List outbound migrations.
#[utoipa::path(
    get,
    path = "/v1/migrations/outbound",
    params(ListMigrationsQuery),
    responses(
        (status = 200, description = "Outbound migrations", body = MigrationList),
    ),
    tag = "migrations"
)]
pub(crate) async fn list_outbound(
    State(state): State<AppState>,
    Query(query): Query<ListMigrationsQuery>,
) -> Json<MigrationList> {
    Json(state.registry.participant_migrations().all_outbound(query.state).into())
}

/// POST /v1/migrations/outbound: Start moving a participant away.
///
/// The response carries the migration key for the target SMP.
#[utoipa::path(
    post,
    path = "/v1/migrations/outbound",
    request_body = StartMigrationRequest,
    responses(
        (status = 201, description = "Migration started", body = serde_json::Value),
        (status = 404, description = "No such service group", body = crate::error::ErrorBody),
        (status = 409, description = "Already in progress or SML inactive", body = crate::error::ErrorBody),
        (status = 502, description = "SML rejected the migration", body = crate::error::ErrorBody),
    ),
    tag = "migrations"
)]
pub(crate) async fn start_outbound(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<StartMigrationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ParticipantMigration>), AppError> {
    let req = extract_json(body)?;
    let participant = state.registry.policy().parse_participant(&req.participant_id)?;
    let group = existing_service_group(&state, &participant)?;
    require_group_access(&caller, &group)?;

    let migration = state
        .registry
        .participant_migrations()
        .start_outbound(caller.actor(), &participant)
        .await?;
    Ok((StatusCode::CREATED, Json(migration)))
}

/// POST /v1/migrations/outbound/:id/cancel: Abandon an outbound migration.
#[utoipa::path(
    post,
    path = "/v1/migrations/outbound/{id}/cancel",
    params(("id" = String, Path, description = "Migration ID")),
    responses(
        (status = 200, description = "Cancelled", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Not an outbound migration in progress", body = crate::error::ErrorBody),
    ),
    tag = "migrations"
)]
pub(crate) async fn cancel_outbound(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<ParticipantMigration>, AppError> {
    accessible_outbound(&state, &caller, &id)?;
    let migration = state
        .registry
        .participant_migrations()
        .cancel_outbound(caller.actor(), &id)?;
    Ok(Json(migration))
}

/// POST /v1/migrations/outbound/:id/finalize: Complete an outbound migration.
///
/// Deletes the service group here without touching the SML.
#[utoipa::path(
    post,
    path = "/v1/migrations/outbound/{id}/finalize",
    params(("id" = String, Path, description = "Migration ID")),
    responses(
        (status = 200, description = "Migrated", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Not an outbound migration in progress", body = crate::error::ErrorBody),
    ),
    tag = "migrations"
)]
pub(crate) async fn finalize_outbound(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Outcome<ParticipantMigration>>, AppError> {
    accessible_outbound(&state, &caller, &id)?;
    let outcome = state
        .registry
        .participant_migrations()
        .finalize_outbound(caller.actor(), &id)
        .await?;
    Ok(Json(outcome))
}

/// GET /v1/migrations/outbound/export: Export the service groups whose
/// outbound migration is in progress, for import at the target SMP.
#[utoipa::path(
    get,
    path = "/v1/migrations/outbound/export",
    responses(
        (status = 200, description = "Exchange XML", content_type = "application/xml", body = String),
    ),
    tag = "migrations"
)]
pub(crate) async fn export_outbound(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<impl IntoResponse, AppError> {
    require_role(&caller, Role::Administrator)?;
    let xml = state
        .registry
        .exchange()
        .export_outbound_migrations_in_progress()?;
    Ok(([(header::CONTENT_TYPE, "application/xml")], xml))
}

// ── Inbound ─────────────────────────────────────────────────────────────────

/// GET /v1/migrations/inbound: List inbound migrations.
#[utoipa::path(
    get,
    path = "/v1/migrations/inbound",
    params(ListMigrationsQuery),
    responses(
        (status = 200, description = "Inbound migrations", body = MigrationList),
    ),
    tag = "migrations"
)]
pub(crate) async fn list_inbound(
    State(state): State<AppState>,
    Query(query): Query<ListMigrationsQuery>,
) -> Json<MigrationList> {
    Json(state.registry.participant_migrations().all_inbound(query.state).into())
}

/// POST /v1/migrations/inbound: Take over a participant from another SMP.
///
/// The SML must accept the key before anything is stored. Failures after
/// that are reported in `warnings`.
#[utoipa::path(
    post,
    path = "/v1/migrations/inbound",
    request_body = InboundMigrationRequest,
    responses(
        (status = 201, description = "Participant migrated here", body = serde_json::Value),
        (status = 409, description = "Participant already here or SML inactive", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 502, description = "SML rejected the key", body = crate::error::ErrorBody),
    ),
    tag = "migrations"
)]
pub(crate) async fn migrate_inbound(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<InboundMigrationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Outcome<InboundMigration>>), AppError> {
    require_role(&caller, Role::Owner)?;
    let req = extract_json(body)?;

    let owner_id = match (caller.role, req.owner_id) {
        (Role::Administrator, Some(owner)) if !owner.trim().is_empty() => owner,
        (Role::Administrator, _) => caller.user_id.clone(),
        (_, Some(owner)) if owner != caller.user_id => {
            return Err(AppError::Forbidden(
                "owners can only migrate participants to themselves".to_string(),
            ))
        }
        _ => caller.user_id.clone(),
    };

    let input = InboundMigrationInput {
        participant_id: req.participant_id,
        migration_key: req.migration_key,
        owner_id,
        extension: req.extension,
    };
    let outcome = state
        .registry
        .participant_migrations()
        .migrate_inbound(caller.actor(), &input)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

// ── Records ─────────────────────────────────────────────────────────────────

/// GET /v1/migrations/:id
#[utoipa::path(
    get,
    path = "/v1/migrations/{id}",
    params(("id" = String, Path, description = "Migration ID")),
    responses(
        (status = 200, description = "Migration", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "migrations"
)]
pub(crate) async fn get_migration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ParticipantMigration>, AppError> {
    state
        .registry
        .participant_migrations()
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("participant migration '{id}'")))
}

/// DELETE /v1/migrations/:id: Forget a migration record.
///
/// The service group and the SML are left alone.
#[utoipa::path(
    delete,
    path = "/v1/migrations/{id}",
    params(("id" = String, Path, description = "Migration ID")),
    responses(
        (status = 200, description = "Deleted", body = ChangeResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "migrations"
)]
pub(crate) async fn delete_migration(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<ChangeResponse>, AppError> {
    require_role(&caller, Role::Administrator)?;
    let change = state
        .registry
        .participant_migrations()
        .delete(caller.actor(), &id)?;
    deleted(change, || format!("participant migration '{id}'")).map(Json)
}
