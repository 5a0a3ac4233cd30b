//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with role-based access control.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{user_id}:{secret}
//! Bearer {secret}                    (administrator)
//! ```
//!
//! Roles are ordered `viewer < owner < administrator`. Viewers read, owners
//! additionally mutate the service groups they own, administrators do
//! everything including settings, SML configuration and import.
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use smp_registry::service_group::ServiceGroup;
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── Role ────────────────────────────────────────────────────────────────────

/// Roles ordered by privilege level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Read-only access.
    Viewer,
    /// Can mutate own service groups and everything below them.
    Owner,
    /// Full access.
    Administrator,
}

impl Role {
    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Owner => "owner",
            Self::Administrator => "administrator",
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// The caller's role.
    pub role: Role,
    /// User ID; recorded as the actor in the audit trail and compared with
    /// service group owners.
    pub user_id: String,
}

impl CallerIdentity {
    /// Check if the caller has at least the given minimum role.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    /// Whether the caller may change `group` and the data below it.
    pub fn can_mutate(&self, group: &ServiceGroup) -> bool {
        match self.role {
            Role::Administrator => true,
            Role::Owner => group.owner_id == self.user_id,
            Role::Viewer => false,
        }
    }

    /// Actor name for the audit trail.
    pub fn actor(&self) -> &str {
        &self.user_id
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
/// Returns 403 Forbidden if the caller's role is insufficient.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

/// Check that the caller may change `group`.
pub fn require_group_access(caller: &CallerIdentity, group: &ServiceGroup) -> Result<(), AppError> {
    require_role(caller, Role::Owner)?;
    if caller.can_mutate(group) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "service group '{}' is owned by another user",
            group.participant_id
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
#[derive(Clone)]
pub struct AuthConfig {
    /// Expected secret. `None` disables authentication.
    pub token: Option<String>,
    /// User ID given to bare-secret callers and to everyone when auth is off.
    pub admin_user: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("admin_user", &self.admin_user)
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer tokens.
///
/// When lengths differ a dummy comparison still runs.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token of the form `{role}:{user_id}:{secret}` or `{secret}`.
pub fn parse_bearer_token(
    provided: &str,
    expected_secret: &str,
    admin_user: &str,
) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                Ok(CallerIdentity {
                    role: Role::Administrator,
                    user_id: admin_user.to_string(),
                })
            } else {
                Err("invalid bearer token".into())
            }
        }
        [role, user_id, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }
            let role = match *role {
                "administrator" => Role::Administrator,
                "owner" => Role::Owner,
                "viewer" => Role::Viewer,
                other => return Err(format!("unknown role: {other}")),
            };
            let user_id = match (user_id.trim(), role) {
                ("", Role::Administrator) => admin_user.to_string(),
                ("", _) => return Err("the token must name a user".into()),
                (id, _) => id.to_string(),
            };
            Ok(CallerIdentity { role, user_id })
        }
        _ => Err("invalid token format, expected {role}:{user_id}:{secret} or {secret}".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the bearer token and inject the [`CallerIdentity`].
///
/// When `AuthConfig.token` is `None`, every request runs as administrator.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let Some(config) = request.extensions().get::<AuthConfig>().cloned() else {
        return unauthorized_response("authentication is not configured");
    };

    let Some(expected) = config.token.as_deref() else {
        request.extensions_mut().insert(CallerIdentity {
            role: Role::Administrator,
            user_id: config.admin_user.clone(),
        });
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(value) if value.starts_with("Bearer ") => {
            match parse_bearer_token(&value[7..], expected, &config.admin_user) {
                Ok(identity) => {
                    request.extensions_mut().insert(identity);
                    next.run(request).await
                }
                Err(msg) => {
                    tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                    unauthorized_response(&msg)
                }
            }
        }
        Some(_) => {
            tracing::warn!("authentication failed: non-Bearer authorization scheme");
            unauthorized_response("authorization header must use Bearer scheme")
        }
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            unauthorized_response("missing authorization header")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
