//! # Business Card API
//!
//! `PUT` replaces the whole card. With Directory integration and automatic
//! updates enabled, every save and delete is mirrored to the Directory; a
//! failing push is returned as a warning and the local change is kept.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use smp_registry::business_card::{BusinessCard, BusinessCardEntityInput, BusinessCardInput};
use smp_registry::outcome::SaveMode;
use smp_registry::Outcome;
use utoipa::ToSchema;

use crate::auth::{require_group_access, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{existing_service_group, extract_json, parse_participant};
use crate::routes::ChangeResponse;
use crate::state::AppState;

/// Business card content.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BusinessCardRequest {
    /// Entities; replaces the stored list.
    #[schema(value_type = Vec<Object>)]
    pub entities: Vec<BusinessCardEntityInput>,
}

/// Build the business card router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/business-cards", get(list_business_cards))
        .route(
            "/v1/business-cards/:participant",
            get(get_business_card)
                .put(save_business_card)
                .delete(delete_business_card),
        )
        .route(
            "/v1/business-cards/:participant/publish",
            post(publish_business_card),
        )
}

/// GET /v1/business-cards: List all business cards.
#[utoipa::path(
    get,
    path = "/v1/business-cards",
    responses(
        (status = 200, description = "Business cards", body = Vec<serde_json::Value>),
    ),
    tag = "business-cards"
)]
pub(crate) async fn list_business_cards(State(state): State<AppState>) -> Json<Vec<BusinessCard>> {
    Json(state.registry.business_cards().get_all())
}

/// GET /v1/business-cards/:participant
#[utoipa::path(
    get,
    path = "/v1/business-cards/{participant}",
    params(("participant" = String, Path, description = "Participant identifier")),
    responses(
        (status = 200, description = "Business card", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "business-cards"
)]
pub(crate) async fn get_business_card(
    State(state): State<AppState>,
    Path(participant): Path<String>,
) -> Result<Json<BusinessCard>, AppError> {
    let participant = parse_participant(&state, &participant)?;
    state
        .registry
        .business_cards()
        .get(&participant)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("business card of '{participant}'")))
}

/// PUT /v1/business-cards/:participant: Create or replace a business card.
#[utoipa::path(
    put,
    path = "/v1/business-cards/{participant}",
    params(("participant" = String, Path, description = "Participant identifier")),
    request_body = BusinessCardRequest,
    responses(
        (status = 201, description = "Business card created", body = serde_json::Value),
        (status = 200, description = "Business card replaced", body = serde_json::Value),
        (status = 422, description = "Invalid fields", body = crate::error::ErrorBody),
    ),
    tag = "business-cards"
)]
pub(crate) async fn save_business_card(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(raw_participant): Path<String>,
    body: Result<Json<BusinessCardRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Outcome<BusinessCard>>), AppError> {
    let participant = parse_participant(&state, &raw_participant)?;
    require_group_access(&caller, &existing_service_group(&state, &participant)?)?;
    let req = extract_json(body)?;

    let registry = state.registry.business_cards();
    let (mode, status) = if registry.get(&participant).is_some() {
        (SaveMode::Edit, StatusCode::OK)
    } else {
        (SaveMode::Create, StatusCode::CREATED)
    };
    let input = BusinessCardInput {
        service_group_id: participant.to_string(),
        entities: req.entities,
    };
    let outcome = registry.create_or_update(caller.actor(), &input, mode).await?;
    Ok((status, Json(outcome)))
}

/// DELETE /v1/business-cards/:participant
#[utoipa::path(
    delete,
    path = "/v1/business-cards/{participant}",
    params(("participant" = String, Path, description = "Participant identifier")),
    responses(
        (status = 200, description = "Deleted", body = ChangeResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "business-cards"
)]
pub(crate) async fn delete_business_card(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(participant): Path<String>,
) -> Result<Json<ChangeResponse>, AppError> {
    let participant = parse_participant(&state, &participant)?;
    require_group_access(&caller, &existing_service_group(&state, &participant)?)?;

    let outcome = state
        .registry
        .business_cards()
        .delete(caller.actor(), &participant)
        .await?;
    if !outcome.value.is_changed() {
        return Err(AppError::NotFound(format!("business card of '{participant}'")));
    }
    Ok(Json(outcome.into()))
}

/// POST /v1/business-cards/:participant/publish: Push the card to the
/// Directory now.
#[utoipa::path(
    post,
    path = "/v1/business-cards/{participant}/publish",
    params(("participant" = String, Path, description = "Participant identifier")),
    responses(
        (status = 204, description = "Published"),
        (status = 404, description = "No business card", body = crate::error::ErrorBody),
        (status = 409, description = "Directory integration disabled", body = crate::error::ErrorBody),
        (status = 502, description = "Directory rejected the card", body = crate::error::ErrorBody),
    ),
    tag = "business-cards"
)]
pub(crate) async fn publish_business_card(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(participant): Path<String>,
) -> Result<StatusCode, AppError> {
    let participant = parse_participant(&state, &participant)?;
    require_group_access(&caller, &existing_service_group(&state, &participant)?)?;

    state
        .registry
        .business_cards()
        .publish_to_index(caller.actor(), &participant)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
