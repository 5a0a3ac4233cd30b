//! # Audit Trail API
//!
//! Read access to the hash-chained audit trail, administrators only.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use smp_registry::audit::{AuditEntry, ChainIntegrity};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::state::AppState;

/// Audit filter.
#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditQuery {
    /// Only entries for this target (participant URI, SMP ID, record key).
    pub target: Option<String>,
}

/// Audit entries, oldest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditList {
    pub count: usize,
    #[schema(value_type = Vec<Object>)]
    pub entries: Vec<AuditEntry>,
}

/// Build the audit router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/audit", get(list_audit))
        .route("/v1/audit/verify", get(verify_audit))
}

/// GET /v1/audit: List audit entries.
#[utoipa::path(
    get,
    path = "/v1/audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit entries", body = AuditList),
        (status = 403, description = "Administrator role required", body = crate::error::ErrorBody),
    ),
    tag = "audit"
)]
pub(crate) async fn list_audit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditList>, AppError> {
    require_role(&caller, Role::Administrator)?;
    let audit = state.registry.audit();
    let entries = match query.target.as_deref() {
        Some(target) => audit.entries_for_target(target),
        None => audit.entries(),
    };
    Ok(Json(AuditList {
        count: entries.len(),
        entries,
    }))
}

/// GET /v1/audit/verify: Verify the hash chain.
#[utoipa::path(
    get,
    path = "/v1/audit/verify",
    responses(
        (status = 200, description = "Chain integrity", body = serde_json::Value),
        (status = 403, description = "Administrator role required", body = crate::error::ErrorBody),
    ),
    tag = "audit"
)]
pub(crate) async fn verify_audit(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<ChainIntegrity>, AppError> {
    require_role(&caller, Role::Administrator)?;
    let integrity = state.registry.audit().verify_chain();
    if !integrity.valid {
        tracing::error!(
            broken_links = integrity.broken_links,
            total = integrity.total,
            "audit chain verification failed"
        );
    }
    Ok(Json(integrity))
}
