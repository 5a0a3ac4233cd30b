//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec served
//! at `/openapi.json`. Registry records are documented as free-form JSON
//! objects.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "SMP Admin API",
        version = "0.3.0",
        description = "Administration of a PEPPOL Service Metadata Publisher: service groups, endpoints, redirects, business cards, SML registration, settings, import/export, participant migration and the audit trail.",
        license(name = "Apache-2.0")
    ),
    paths(
        // Service groups
        crate::routes::service_groups::list_service_groups,
        crate::routes::service_groups::create_service_group,
        crate::routes::service_groups::get_service_group,
        crate::routes::service_groups::update_service_group,
        crate::routes::service_groups::delete_service_group,
        crate::routes::service_groups::check_dns,
        // Service information and endpoints
        crate::routes::service_info::list_service_information,
        crate::routes::service_info::get_service_information,
        crate::routes::service_info::delete_service_information,
        crate::routes::service_info::delete_process,
        crate::routes::service_info::create_endpoint,
        crate::routes::service_info::edit_endpoint,
        crate::routes::service_info::get_endpoint,
        crate::routes::service_info::delete_endpoint,
        crate::routes::service_info::change_certificate,
        crate::routes::service_info::change_url,
        // Redirects
        crate::routes::redirects::list_redirects,
        crate::routes::redirects::create_redirect,
        crate::routes::redirects::edit_redirect,
        crate::routes::redirects::get_redirect,
        crate::routes::redirects::delete_redirect,
        // Business cards
        crate::routes::business_cards::list_business_cards,
        crate::routes::business_cards::get_business_card,
        crate::routes::business_cards::save_business_card,
        crate::routes::business_cards::delete_business_card,
        crate::routes::business_cards::publish_business_card,
        // SML
        crate::routes::sml::get_registration,
        crate::routes::sml::register,
        crate::routes::sml::update_registration,
        crate::routes::sml::unregister,
        crate::routes::sml::check_registration_dns,
        crate::routes::sml::list_sml_infos,
        crate::routes::sml::create_sml_info,
        crate::routes::sml::get_sml_info,
        crate::routes::sml::update_sml_info,
        crate::routes::sml::delete_sml_info,
        // Transport profiles
        crate::routes::transport_profiles::list_transport_profiles,
        crate::routes::transport_profiles::create_transport_profile,
        crate::routes::transport_profiles::get_transport_profile,
        crate::routes::transport_profiles::update_transport_profile,
        crate::routes::transport_profiles::delete_transport_profile,
        // Settings
        crate::routes::settings::get_settings,
        crate::routes::settings::update_settings,
        // Exchange
        crate::routes::exchange::export,
        crate::routes::exchange::import,
        // Participant migration
        crate::routes::migrations::list_outbound,
        crate::routes::migrations::start_outbound,
        crate::routes::migrations::cancel_outbound,
        crate::routes::migrations::finalize_outbound,
        crate::routes::migrations::export_outbound,
        crate::routes::migrations::list_inbound,
        crate::routes::migrations::migrate_inbound,
        crate::routes::migrations::get_migration,
        crate::routes::migrations::delete_migration,
        // Audit
        crate::routes::audit::list_audit,
        crate::routes::audit::verify_audit,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::auth::Role,
        crate::routes::ChangeResponse,
        crate::routes::service_groups::CreateServiceGroupRequest,
        crate::routes::service_groups::UpdateServiceGroupRequest,
        crate::routes::service_groups::ServiceGroupList,
        crate::routes::service_info::BulkChangeRequest,
        crate::routes::business_cards::BusinessCardRequest,
        crate::routes::sml::SmlRegistrationRequest,
        crate::routes::transport_profiles::CreateTransportProfileRequest,
        crate::routes::transport_profiles::UpdateTransportProfileRequest,
        crate::routes::migrations::StartMigrationRequest,
        crate::routes::migrations::InboundMigrationRequest,
        crate::routes::migrations::MigrationList,
        crate::routes::audit::AuditList,
    )),
    tags(
        (name = "service-groups", description = "Participants registered at this SMP"),
        (name = "service-information", description = "Document types and processes of a service group"),
        (name = "endpoints", description = "Access points per process and transport profile"),
        (name = "bulk", description = "Certificate and URL replacement across endpoints"),
        (name = "redirects", description = "Document types served by another SMP"),
        (name = "business-cards", description = "Business cards and Directory publication"),
        (name = "sml", description = "SMP registration at the SML"),
        (name = "transport-profiles", description = "Transport profile catalogue"),
        (name = "settings", description = "Runtime settings"),
        (name = "exchange", description = "XML import and export"),
        (name = "migrations", description = "Participant migration between SMPs"),
        (name = "audit", description = "Audit trail"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
