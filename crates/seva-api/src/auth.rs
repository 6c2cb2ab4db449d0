//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with role-based access control.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{identity_id}:{secret}
//! Bearer {secret}                         (treated as admin)
//! ```
//!
//! The secret is compared in constant time. The identity id binds the
//! caller to one registry entry; customers may only act for that id.
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use seva_core::{IdentityId, Role};

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    /// `None` for the bare-secret admin token and when auth is disabled.
    pub identity_id: Option<IdentityId>,
}

impl CallerIdentity {
    /// The identity used when authentication is disabled.
    pub fn unrestricted() -> Self {
        Self {
            role: Role::Admin,
            identity_id: None,
        }
    }

    /// `Role` derives `Ord` as `Customer < B2b < Staff < Admin`.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    pub fn is(&self, identity_id: IdentityId) -> bool {
        self.identity_id == Some(identity_id)
    }

    /// Rate-limit bucket key.
    pub fn key(&self) -> String {
        match self.identity_id {
            Some(id) => id.to_string(),
            None => format!("role:{}", self.role),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
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

/// Check that the caller may act as `actor`. Admins may act as anyone;
/// everyone else only as the identity bound to their token.
pub fn authorize_actor(caller: &CallerIdentity, actor: IdentityId) -> Result<(), AppError> {
    if caller.role == Role::Admin || caller.is(actor) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "caller may not act as {actor}"
        )))
    }
}

/// Check that the caller may read records belonging to `owner`: the owner
/// themself, or staff.
pub fn authorize_reader(caller: &CallerIdentity, owner: IdentityId) -> Result<(), AppError> {
    if caller.has_role(Role::Staff) || caller.is(owner) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "caller may not read records of {owner}"
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets. Mismatched lengths still
/// run one comparison.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token of the form `{role}:{identity_id}:{secret}` or
/// `{secret}`.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                Ok(CallerIdentity::unrestricted())
            } else {
                Err("invalid bearer token".into())
            }
        }
        [role_str, identity_str, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }

            let role = Role::parse(role_str).ok_or_else(|| format!("unknown role: {role_str}"))?;

            let identity_id = if identity_str.is_empty() {
                None
            } else {
                let uuid = identity_str
                    .parse::<Uuid>()
                    .map_err(|e| format!("invalid identity_id: {e}"))?;
                Some(IdentityId::from_uuid(uuid))
            };

            // Only admins may hold a token that is not bound to an identity.
            if identity_id.is_none() && role != Role::Admin {
                return Err(format!("role '{role}' requires an identity_id"));
            }

            Ok(CallerIdentity { role, identity_id })
        }
        _ => Err("invalid token format, expected {role}:{identity_id}:{secret} or {secret}".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the Bearer token and inject [`CallerIdentity`].
///
/// When `AuthConfig.token` is `None`, every request runs as admin.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    match expected_token {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header.map(|v| v.strip_prefix("Bearer ")) {
                Some(Some(provided)) => match parse_bearer_token(provided, expected) {
                    Ok(identity) => {
                        request.extensions_mut().insert(identity);
                        next.run(request).await
                    }
                    Err(msg) => {
                        tracing::warn!(
                            reason = %msg,
                            "authentication failed: invalid bearer token"
                        );
                        unauthorized_response(&msg)
                    }
                },
                Some(None) => {
                    tracing::warn!("authentication failed: non-Bearer authorization scheme");
                    unauthorized_response("authorization header must use Bearer scheme")
                }
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    unauthorized_response("missing authorization header")
                }
            }
        }
        _ => {
            request.extensions_mut().insert(CallerIdentity::unrestricted());
            next.run(request).await
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
