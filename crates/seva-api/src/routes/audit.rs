//! # Audit Trail API
//!
//! Read access to the hash-chained audit log. The log lives only in
//! Postgres; without a database these endpoints report storage as
//! unavailable.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use seva_core::Role;

use crate::auth::{require_role, CallerIdentity};
use crate::db::audit::{self, AuditEventRow, ChainIntegrityResult};
use crate::error::AppError;
use crate::extractors::extract_query;
use crate::state::AppState;

/// Resource types that appear in the audit log.
const RESOURCE_TYPES: &[&str] = &[
    "identity",
    "service",
    "document",
    "order",
    "wallet_transaction",
    "settings",
];

const DEFAULT_VERIFY_LIMIT: i64 = 10_000;

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Build the audit router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/audit/verify", get(verify_chain))
        .route("/v1/audit/{resource_type}/{id}", get(resource_events))
}

fn pool(state: &AppState) -> Result<&PgPool, AppError> {
    state
        .db_pool
        .as_ref()
        .ok_or_else(|| AppError::StorageUnavailable("audit log requires a database".into()))
}

fn storage_error(err: sqlx::Error) -> AppError {
    AppError::StorageUnavailable(err.to_string())
}

/// GET /v1/audit/{resource_type}/{id}: Events for one record, oldest first.
#[utoipa::path(
    get,
    path = "/v1/audit/{resource_type}/{id}",
    params(
        ("resource_type" = String, Path, description = "order, identity, service, document, wallet_transaction, or settings"),
        ("id" = Uuid, Path, description = "Resource ID"),
    ),
    responses(
        (status = 200, description = "Audit events, oldest first"),
        (status = 403, description = "Staff role required", body = crate::error::ErrorBody),
        (status = 503, description = "No database configured", body = crate::error::ErrorBody),
    ),
    tag = "audit"
)]
pub(crate) async fn resource_events(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((resource_type, id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<AuditEventRow>>, AppError> {
    require_role(&caller, Role::Staff)?;
    if !RESOURCE_TYPES.contains(&resource_type.as_str()) {
        return Err(AppError::NotFound(format!(
            "unknown resource type '{resource_type}'"
        )));
    }
    let events = audit::events_for_resource(pool(&state)?, &resource_type, id)
        .await
        .map_err(storage_error)?;
    Ok(Json(events))
}

/// GET /v1/audit/verify: Recompute the hash chain.
#[utoipa::path(
    get,
    path = "/v1/audit/verify",
    params(
        ("limit" = Option<i64>, Query, description = "Events to check from the start of the chain"),
    ),
    responses(
        (status = 200, description = "Chain verification result"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 503, description = "No database configured", body = crate::error::ErrorBody),
    ),
    tag = "audit"
)]
pub(crate) async fn verify_chain(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<VerifyQuery>, QueryRejection>,
) -> Result<Json<ChainIntegrityResult>, AppError> {
    require_role(&caller, Role::Admin)?;
    let limit = extract_query(query)?.limit.unwrap_or(DEFAULT_VERIFY_LIMIT);
    if limit <= 0 {
        return Err(AppError::validation("limit must be positive"));
    }
    let result = audit::verify_chain_integrity(pool(&state)?, limit)
        .await
        .map_err(storage_error)?;
    if !result.chain_valid {
        tracing::error!(
            broken_links = result.broken_links,
            total_events = result.total_events,
            "audit chain verification failed"
        );
    }
    Ok(Json(result))
}
