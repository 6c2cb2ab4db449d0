//! # Wallet API
//!
//! Prepaid balances. Credits come from staff (cash or bank deposits taken
//! at the counter); debits and refunds only ever happen as part of an
//! order transition and have no endpoint of their own.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use seva_core::{Amount, IdentityId, Role};
use seva_wallet::{BalanceSnapshot, WalletTransaction};

use crate::auth::{authorize_reader, require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_non_blank, Validate};
use crate::orchestration;
use crate::state::AppState;

/// Credit a wallet.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AddFundsRequest {
    /// Minor units (paise).
    pub amount: i64,
    /// Shown on the customer's statement, e.g. "Cash deposit".
    pub description: String,
}

impl Validate for AddFundsRequest {
    fn validate(&self) -> Result<(), String> {
        if self.amount <= 0 {
            return Err("amount must be positive".to_string());
        }
        require_non_blank("description", &self.description)
    }
}

/// Transactions, newest first, with the balance they sum to.
#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub identity_id: IdentityId,
    pub balance: Amount,
    pub transactions: Vec<WalletTransaction>,
}

/// Build the wallet router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/wallet/{identity_id}/funds", post(add_funds))
        .route("/v1/wallet/{identity_id}/transactions", get(list_transactions))
        .route("/v1/wallet/{identity_id}/balance", get(get_balance))
}

/// POST /v1/wallet/{identity_id}/funds: Credit a wallet.
#[utoipa::path(
    post,
    path = "/v1/wallet/{identity_id}/funds",
    params(("identity_id" = Uuid, Path, description = "Wallet owner")),
    request_body = AddFundsRequest,
    responses(
        (status = 201, description = "Credit recorded"),
        (status = 403, description = "Staff role required", body = crate::error::ErrorBody),
        (status = 404, description = "Identity not found", body = crate::error::ErrorBody),
    ),
    tag = "wallet"
)]
pub(crate) async fn add_funds(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(identity_id): Path<Uuid>,
    body: Result<Json<AddFundsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WalletTransaction>), AppError> {
    require_role(&caller, Role::Staff)?;
    let req = extract_validated_json(body)?;
    let txn = orchestration::add_funds(
        &state,
        caller.identity_id,
        IdentityId::from_uuid(identity_id),
        Amount::from_minor(req.amount),
        req.description.trim(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(txn)))
}

/// GET /v1/wallet/{identity_id}/transactions: Statement.
#[utoipa::path(
    get,
    path = "/v1/wallet/{identity_id}/transactions",
    params(("identity_id" = Uuid, Path, description = "Wallet owner")),
    responses(
        (status = 200, description = "Transactions, newest first"),
        (status = 404, description = "Identity not found", body = crate::error::ErrorBody),
    ),
    tag = "wallet"
)]
pub(crate) async fn list_transactions(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(identity_id): Path<Uuid>,
) -> Result<Json<TransactionsResponse>, AppError> {
    let identity_id = IdentityId::from_uuid(identity_id);
    authorize_reader(&caller, identity_id)?;
    let (balance, transactions) = orchestration::statement(&state, identity_id)?;
    Ok(Json(TransactionsResponse {
        identity_id,
        balance,
        transactions,
    }))
}

/// GET /v1/wallet/{identity_id}/balance: Balance snapshot.
#[utoipa::path(
    get,
    path = "/v1/wallet/{identity_id}/balance",
    params(("identity_id" = Uuid, Path, description = "Wallet owner")),
    responses(
        (status = 200, description = "Current balance"),
        (status = 404, description = "Identity not found", body = crate::error::ErrorBody),
    ),
    tag = "wallet"
)]
pub(crate) async fn get_balance(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(identity_id): Path<Uuid>,
) -> Result<Json<BalanceSnapshot>, AppError> {
    let identity_id = IdentityId::from_uuid(identity_id);
    authorize_reader(&caller, identity_id)?;
    Ok(Json(orchestration::balance(&state, identity_id)?))
}
