//! # smp-api: Admin REST API of the SMP
//!
//! JSON API over the [`smp_registry`] registries. Every write goes through
//! the same registry operations the CLI uses, so validation, conflict rules,
//! SML/Directory synchronization and auditing are identical on both
//! surfaces.
//!
//! ## API Surface
//!
//! | Prefix                          | Module                          |
//! |---------------------------------|---------------------------------|
//! | `/v1/service-groups/*`          | [`routes::service_groups`], [`routes::service_info`] |
//! | `/v1/endpoints/*`, `/v1/bulk/*` | [`routes::service_info`]        |
//! | `/v1/redirects/*`               | [`routes::redirects`]           |
//! | `/v1/business-cards/*`          | [`routes::business_cards`]      |
//! | `/v1/sml/*`, `/v1/sml-infos/*`  | [`routes::sml`]                 |
//! | `/v1/transport-profiles/*`      | [`routes::transport_profiles`]  |
//! | `/v1/settings`                  | [`routes::settings`]            |
//! | `/v1/export`, `/v1/import`      | [`routes::exchange`]            |
//! | `/v1/migrations/*`              | [`routes::migrations`]          |
//! | `/v1/audit/*`                   | [`routes::audit`]               |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → AuthMiddleware → WriteGuard → Handler
//! ```
//!
//! ## OpenAPI
//!
//! Generated via utoipa derive macros, served at `/openapi.json`.

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod remote;
pub mod routes;
pub mod state;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) are mounted outside the auth middleware
/// so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = state.auth_config();

    // Authenticated API routes.
    let api = Router::new()
        .merge(routes::service_groups::router())
        .merge(routes::service_info::router())
        .merge(routes::redirects::router())
        .merge(routes::business_cards::router())
        .merge(routes::sml::router())
        .merge(routes::transport_profiles::router())
        .merge(routes::settings::router())
        .merge(routes::exchange::router())
        .merge(routes::migrations::router())
        .merge(routes::audit::router())
        .merge(openapi::router())
        .layer(from_fn_with_state(state.clone(), middleware::writes_guard))
        .layer(from_fn(auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state);

    // Unauthenticated health probes.
    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new().merge(health).merge(api)
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: returns 200 when the application is ready to serve.
async fn readiness() -> &'static str {
    "ready"
}
