//! # Write Guard
//!
//! Rejects mutating `/v1` calls while the `restWritableApiDisabled` setting
//! is on. `/v1/settings` stays writable so the switch can be turned off
//! again through the API.

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::state::AppState;

fn is_read_only(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Middleware enforcing `restWritableApiDisabled`.
pub async fn writes_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    let guarded = !is_read_only(request.method())
        && path.starts_with("/v1/")
        && path != "/v1/settings";

    if guarded && state.registry.settings().get().rest_writable_api_disabled {
        tracing::warn!(method = %request.method(), path, "write rejected, REST writes are disabled");
        return AppError::Forbidden("the writable REST API is disabled".to_string()).into_response();
    }

    next.run(request).await
}
