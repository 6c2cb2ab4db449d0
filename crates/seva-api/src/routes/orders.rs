//! # Orders API
//!
//! Submission, the staff workflow, and order listings.
//!
//! ## Endpoints
//!
//! - `POST /v1/orders`: submit an order (optionally prepaid).
//! - `GET  /v1/orders?filter=pool|assigned_to|submitted_by&identity_id=`
//! - `GET  /v1/orders/{id}`: order with its transition log.
//! - `POST /v1/orders/{id}/claim`
//! - `POST /v1/orders/{id}/documents/{tag}/reject`
//! - `POST /v1/orders/{id}/documents/{tag}/reupload`
//! - `POST /v1/orders/{id}/complete`: charges the payer unless prepaid.
//! - `POST /v1/orders/{id}/reject`: terminal; refunds a paid order.
//!
//! Every write names the identity performing it (`staff_id`,
//! `submitted_by`, `actor_id`). The caller's token must be bound to that
//! identity unless the caller is an admin.

use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use seva_core::{
    DocTag, DocumentId, FieldViolation, IdentityId, OrderId, Role, ServiceId, ValidationFailure,
};
use seva_state::{Order, OrderFilter};

use crate::auth::{authorize_actor, authorize_reader, require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, require_non_blank, Validate};
use crate::orchestration::{self, OrderRequest};
use crate::state::AppState;

// -- Request types ------------------------------------------------------------

/// Request to submit an order.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    /// Identity placing the order. Staff submitting on someone's behalf
    /// pass their own id here and the beneficiary as `target_id`.
    pub submitted_by: Uuid,
    pub service_id: Uuid,
    /// Beneficiary. Defaults to `submitted_by`.
    #[serde(default)]
    pub target_id: Option<Uuid>,
    #[serde(default)]
    pub form_data: BTreeMap<String, String>,
    /// Required document tag to vault document id.
    #[serde(default)]
    pub document_refs: BTreeMap<String, Uuid>,
    /// Debit the price now instead of on completion.
    #[serde(default)]
    pub pay_now: bool,
}

impl Validate for CreateOrderRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(tag) = self.document_refs.keys().find(|k| k.trim().is_empty()) {
            return Err(format!("document tag '{tag}' must not be blank"));
        }
        Ok(())
    }
}

/// Staff action with no further input.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ClaimOrderRequest {
    pub staff_id: Uuid,
}

impl Validate for ClaimOrderRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Flag one document for correction, or reject the whole order.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectRequest {
    pub staff_id: Uuid,
    pub reason: String,
}

impl Validate for RejectRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("reason", &self.reason)
    }
}

/// Relink a flagged tag to a newly uploaded document.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReuploadRequest {
    /// The submitter, the beneficiary, or staff.
    pub actor_id: Uuid,
    pub document_id: Uuid,
}

impl Validate for ReuploadRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteOrderRequest {
    pub staff_id: Uuid,
    /// Deliverables keyed by result tag, already uploaded to the
    /// beneficiary's vault under that tag.
    #[serde(default)]
    pub output_document_ids: BTreeMap<String, Uuid>,
}

impl CompleteOrderRequest {
    fn outputs(&self) -> Result<BTreeMap<DocTag, DocumentId>, AppError> {
        let mut outputs = BTreeMap::new();
        let mut violations = Vec::new();
        for (raw, id) in &self.output_document_ids {
            match DocTag::new(raw) {
                Ok(tag) => {
                    if outputs.insert(tag, DocumentId::from_uuid(*id)).is_some() {
                        violations.push(FieldViolation::new(raw, "duplicate result tag"));
                    }
                }
                Err(problem) => violations.push(FieldViolation::new(raw, problem)),
            }
        }
        if !violations.is_empty() {
            return Err(AppError::Validation(ValidationFailure::with_fields(
                "invalid output documents",
                violations,
            )));
        }
        Ok(outputs)
    }
}

impl Validate for CompleteOrderRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Which listing `GET /v1/orders` returns.
#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ListFilter {
    /// Unassigned open orders, oldest first. Staff only.
    #[default]
    Pool,
    AssignedTo,
    SubmittedBy,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default)]
    pub filter: ListFilter,
    /// Defaults to the caller's own identity.
    #[serde(default)]
    pub identity_id: Option<Uuid>,
}

// -- Router -------------------------------------------------------------------

/// Build the orders router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order).get(list_orders))
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/claim", post(claim_order))
        .route(
            "/v1/orders/{id}/documents/{tag}/reject",
            post(reject_document),
        )
        .route(
            "/v1/orders/{id}/documents/{tag}/reupload",
            post(reupload_document),
        )
        .route("/v1/orders/{id}/complete", post(complete_order))
        .route("/v1/orders/{id}/reject", post(reject_order))
}

/// Staff may read any order; others only orders they submitted or that
/// were placed for them.
fn authorize_order_reader(caller: &CallerIdentity, order: &Order) -> Result<(), AppError> {
    if caller.has_role(Role::Staff) || caller.is(order.submitted_by) || caller.is(order.target_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "caller may not access {}",
            order.id
        )))
    }
}

/// Staff workflow actions: staff role, acting as the named staff member.
fn authorize_staff_actor(caller: &CallerIdentity, staff_id: IdentityId) -> Result<(), AppError> {
    require_role(caller, Role::Staff)?;
    authorize_actor(caller, staff_id)
}

// -- Handlers -----------------------------------------------------------------

/// POST /v1/orders: Submit an order.
#[utoipa::path(
    post,
    path = "/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order received"),
        (status = 402, description = "Prepayment exceeds wallet balance", body = crate::error::ErrorBody),
        (status = 403, description = "Caller may not act as submitter", body = crate::error::ErrorBody),
        (status = 404, description = "Service or identity not found", body = crate::error::ErrorBody),
        (status = 422, description = "Missing or invalid documents or form fields", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn create_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let req = extract_validated_json(body)?;
    let submitter = IdentityId::from_uuid(req.submitted_by);
    authorize_actor(&caller, submitter)?;

    let request = OrderRequest {
        service_id: ServiceId::from_uuid(req.service_id),
        target_id: req.target_id.map(IdentityId::from_uuid),
        form_data: req.form_data,
        document_refs: req
            .document_refs
            .into_iter()
            .map(|(tag, id)| (tag, DocumentId::from_uuid(id)))
            .collect(),
        pay_now: req.pay_now,
    };
    let order = orchestration::submit_order(&state, submitter, request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /v1/orders: List orders.
#[utoipa::path(
    get,
    path = "/v1/orders",
    params(
        ("filter" = Option<String>, Query, description = "pool (default), assigned_to, or submitted_by"),
        ("identity_id" = Option<Uuid>, Query, description = "Staff member or submitter; defaults to the caller"),
    ),
    responses(
        (status = 200, description = "Matching orders"),
        (status = 403, description = "Caller may not see this listing", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn list_orders(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<Vec<Order>>, AppError> {
    let query = extract_query(query)?;
    let subject = || {
        query
            .identity_id
            .map(IdentityId::from_uuid)
            .or(caller.identity_id)
            .ok_or_else(|| AppError::validation("identity_id is required for this filter"))
    };

    let filter = match query.filter {
        ListFilter::Pool => {
            require_role(&caller, Role::Staff)?;
            OrderFilter::Pool
        }
        ListFilter::AssignedTo => {
            let staff = subject()?;
            authorize_reader(&caller, staff)?;
            OrderFilter::AssignedTo(staff)
        }
        ListFilter::SubmittedBy => {
            let submitter = subject()?;
            authorize_reader(&caller, submitter)?;
            OrderFilter::SubmittedBy(submitter)
        }
    };
    Ok(Json(orchestration::list_orders(&state, filter)))
}

/// GET /v1/orders/{id}: Fetch an order with its transition log.
#[utoipa::path(
    get,
    path = "/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order found"),
        (status = 404, description = "Order not found", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn get_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = orchestration::order(&state, OrderId::from_uuid(id))?;
    authorize_order_reader(&caller, &order)?;
    Ok(Json(order))
}

/// POST /v1/orders/{id}/claim: Take an order from the pool.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/claim",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ClaimOrderRequest,
    responses(
        (status = 200, description = "Order claimed"),
        (status = 409, description = "Already claimed or not claimable", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn claim_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ClaimOrderRequest>, JsonRejection>,
) -> Result<Json<Order>, AppError> {
    let req = extract_validated_json(body)?;
    let staff = IdentityId::from_uuid(req.staff_id);
    authorize_staff_actor(&caller, staff)?;
    let order = orchestration::claim_order(&state, OrderId::from_uuid(id), staff).await?;
    Ok(Json(order))
}

/// POST /v1/orders/{id}/documents/{tag}/reject: Flag a document for correction.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/documents/{tag}/reject",
    params(
        ("id" = Uuid, Path, description = "Order ID"),
        ("tag" = String, Path, description = "Required document tag"),
    ),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Order moved to action_required"),
        (status = 409, description = "Order not in processing or not assigned to caller", body = crate::error::ErrorBody),
        (status = 422, description = "Tag not required by the service", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn reject_document(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((id, tag)): Path<(Uuid, String)>,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Json<Order>, AppError> {
    let req = extract_validated_json(body)?;
    let staff = IdentityId::from_uuid(req.staff_id);
    authorize_staff_actor(&caller, staff)?;
    let order =
        orchestration::reject_document(&state, OrderId::from_uuid(id), staff, &tag, &req.reason)
            .await?;
    Ok(Json(order))
}

/// POST /v1/orders/{id}/documents/{tag}/reupload: Replace a flagged document.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/documents/{tag}/reupload",
    params(
        ("id" = Uuid, Path, description = "Order ID"),
        ("tag" = String, Path, description = "Flagged document tag"),
    ),
    request_body = ReuploadRequest,
    responses(
        (status = 200, description = "Document replaced"),
        (status = 409, description = "Order not awaiting correction, or actor is not a party to it", body = crate::error::ErrorBody),
        (status = 422, description = "Tag not flagged, or document invalid", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn reupload_document(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((id, tag)): Path<(Uuid, String)>,
    body: Result<Json<ReuploadRequest>, JsonRejection>,
) -> Result<Json<Order>, AppError> {
    let req = extract_validated_json(body)?;
    let actor_id = IdentityId::from_uuid(req.actor_id);
    authorize_actor(&caller, actor_id)?;

    let order = orchestration::reupload_document(
        &state,
        OrderId::from_uuid(id),
        actor_id,
        &tag,
        DocumentId::from_uuid(req.document_id),
    )
    .await?;
    Ok(Json(order))
}

/// POST /v1/orders/{id}/complete: Deliver and charge.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/complete",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CompleteOrderRequest,
    responses(
        (status = 200, description = "Order completed and charged"),
        (status = 402, description = "Payer's balance does not cover the price; order unchanged", body = crate::error::ErrorBody),
        (status = 409, description = "Order not in processing or not assigned to caller", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn complete_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<CompleteOrderRequest>, JsonRejection>,
) -> Result<Json<Order>, AppError> {
    let req = extract_validated_json(body)?;
    let staff = IdentityId::from_uuid(req.staff_id);
    authorize_staff_actor(&caller, staff)?;
    let outputs = req.outputs()?;
    let order =
        orchestration::complete_order(&state, OrderId::from_uuid(id), staff, outputs).await?;
    Ok(Json(order))
}

/// POST /v1/orders/{id}/reject: Reject the whole order.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/reject",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Order rejected; refunded if it was paid"),
        (status = 409, description = "Order already terminal", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn reject_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Json<Order>, AppError> {
    let req = extract_validated_json(body)?;
    let staff = IdentityId::from_uuid(req.staff_id);
    authorize_staff_actor(&caller, staff)?;
    let order =
        orchestration::reject_order(&state, OrderId::from_uuid(id), staff, &req.reason).await?;
    Ok(Json(order))
}
