//! # Identity Registry API
//!
//! Customers are registered at the counter by staff; staff and admin
//! accounts are provisioned by admins. Identities are never deleted,
//! only revoked, so orders and ledger entries that reference them keep
//! resolving.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use seva_core::{normalize_phone, Amount, Identity, IdentityId, Role};

use crate::auth::{authorize_reader, require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, require_non_blank, Validate};
use crate::orchestration::{self, NewIdentity};
use crate::state::AppState;

/// Register an identity.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterIdentityRequest {
    pub name: String,
    /// Unique across the registry after normalization.
    pub phone: String,
    /// Defaults to `customer`.
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "customer")]
    pub role: Option<Role>,
    #[serde(default)]
    pub father_name: Option<String>,
    #[serde(default)]
    pub village: Option<String>,
}

impl Validate for RegisterIdentityRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("name", &self.name)?;
        require_non_blank("phone", &self.phone)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangeRoleRequest {
    #[schema(value_type = String, example = "staff")]
    pub role: Role,
}

impl Validate for ChangeRoleRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct IdentityQuery {
    #[serde(default)]
    pub phone: Option<String>,
}

/// An identity with its wallet balance.
#[derive(Debug, Serialize)]
pub struct IdentityView {
    #[serde(flatten)]
    pub identity: Identity,
    pub wallet_balance: Amount,
}

/// Build the identities router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/identities", post(register_identity).get(find_identities))
        .route("/v1/identities/{id}", get(get_identity))
        .route("/v1/identities/{id}/role", put(change_role))
        .route("/v1/identities/{id}/revoke", post(revoke_identity))
}

fn view(state: &AppState, identity: Identity) -> Result<IdentityView, AppError> {
    let wallet_balance = orchestration::balance(state, identity.id)?.balance;
    Ok(IdentityView {
        identity,
        wallet_balance,
    })
}

/// POST /v1/identities: Register an identity.
#[utoipa::path(
    post,
    path = "/v1/identities",
    request_body = RegisterIdentityRequest,
    responses(
        (status = 201, description = "Identity registered"),
        (status = 403, description = "Staff role required; admin role for staff and admin accounts", body = crate::error::ErrorBody),
        (status = 409, description = "Phone number already registered", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid name or phone", body = crate::error::ErrorBody),
    ),
    tag = "identities"
)]
pub(crate) async fn register_identity(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<RegisterIdentityRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IdentityView>), AppError> {
    require_role(&caller, Role::Staff)?;
    let req = extract_validated_json(body)?;
    let role = req.role.unwrap_or(Role::Customer);
    if role.is_staff() {
        require_role(&caller, Role::Admin)?;
    }

    let identity = orchestration::register_identity(
        &state,
        caller.identity_id,
        NewIdentity {
            name: req.name,
            phone: req.phone,
            role,
            father_name: req.father_name,
            village: req.village,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(view(&state, identity)?)))
}

/// GET /v1/identities: Look up identities, optionally by phone.
#[utoipa::path(
    get,
    path = "/v1/identities",
    params(("phone" = Option<String>, Query, description = "Phone number, any formatting")),
    responses(
        (status = 200, description = "Matching identities"),
        (status = 403, description = "Staff role required", body = crate::error::ErrorBody),
    ),
    tag = "identities"
)]
pub(crate) async fn find_identities(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<IdentityQuery>, QueryRejection>,
) -> Result<Json<Vec<Identity>>, AppError> {
    require_role(&caller, Role::Staff)?;
    let query = extract_query(query)?;
    let mut found = match query.phone.as_deref().map(normalize_phone) {
        Some(phone) => state.identities.filter(|i| i.phone == phone),
        None => state.identities.list(),
    };
    found.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(Json(found))
}

/// GET /v1/identities/{id}: Fetch an identity.
#[utoipa::path(
    get,
    path = "/v1/identities/{id}",
    params(("id" = Uuid, Path, description = "Identity ID")),
    responses(
        (status = 200, description = "Identity with wallet balance"),
        (status = 404, description = "Identity not found", body = crate::error::ErrorBody),
    ),
    tag = "identities"
)]
pub(crate) async fn get_identity(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<IdentityView>, AppError> {
    let id = IdentityId::from_uuid(id);
    authorize_reader(&caller, id)?;
    let identity = orchestration::identity(&state, id)?;
    Ok(Json(view(&state, identity)?))
}

/// PUT /v1/identities/{id}/role: Change an identity's role.
#[utoipa::path(
    put,
    path = "/v1/identities/{id}/role",
    params(("id" = Uuid, Path, description = "Identity ID")),
    request_body = ChangeRoleRequest,
    responses(
        (status = 200, description = "Role changed"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 409, description = "Identity revoked", body = crate::error::ErrorBody),
    ),
    tag = "identities"
)]
pub(crate) async fn change_role(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ChangeRoleRequest>, JsonRejection>,
) -> Result<Json<IdentityView>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let identity =
        orchestration::change_role(&state, caller.identity_id, IdentityId::from_uuid(id), req.role)
            .await?;
    Ok(Json(view(&state, identity)?))
}

/// POST /v1/identities/{id}/revoke: Soft-revoke an identity.
#[utoipa::path(
    post,
    path = "/v1/identities/{id}/revoke",
    params(("id" = Uuid, Path, description = "Identity ID")),
    responses(
        (status = 200, description = "Identity revoked"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 404, description = "Identity not found", body = crate::error::ErrorBody),
    ),
    tag = "identities"
)]
pub(crate) async fn revoke_identity(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<IdentityView>, AppError> {
    require_role(&caller, Role::Admin)?;
    let identity =
        orchestration::revoke_identity(&state, caller.identity_id, IdentityId::from_uuid(id))
            .await?;
    Ok(Json(view(&state, identity)?))
}
