//! # Service Catalog API
//!
//! Admins define the services the counter offers: prices for normal and
//! B2B customers, the documents an application needs, and the form
//! fields it collects. Revisions are additive only, so orders already in
//! flight stay valid against the definition they were submitted under.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use seva_core::{
    Amount, DocTag, FieldViolation, FormField, Role, ServiceDefinition, ServiceId, ServiceRevision,
    ValidationFailure,
};

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_non_blank, Validate};
use crate::orchestration;
use crate::state::AppState;

/// A full service definition, used for both create and revise.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ServiceRequest {
    pub name: String,
    /// Minor units.
    pub price_normal: i64,
    /// Minor units.
    pub price_b2b: i64,
    #[serde(default)]
    pub required_documents: Vec<String>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub form_schema: Vec<FormField>,
}

impl Validate for ServiceRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("name", &self.name)
    }
}

impl ServiceRequest {
    fn into_revision(self) -> Result<ServiceRevision, AppError> {
        let mut violations = Vec::new();
        let mut required_documents = Vec::with_capacity(self.required_documents.len());
        for (i, raw) in self.required_documents.iter().enumerate() {
            match DocTag::new(raw) {
                Ok(tag) => required_documents.push(tag),
                Err(problem) => violations.push(FieldViolation::new(
                    format!("required_documents[{i}]"),
                    problem,
                )),
            }
        }
        if !violations.is_empty() {
            return Err(AppError::Validation(ValidationFailure::with_fields(
                "invalid document tags",
                violations,
            )));
        }
        Ok(ServiceRevision {
            name: self.name,
            price_normal: Amount::from_minor(self.price_normal),
            price_b2b: Amount::from_minor(self.price_b2b),
            required_documents,
            form_schema: self.form_schema,
        })
    }
}

/// Build the services router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/services", get(list_services).post(create_service))
        .route("/v1/services/{id}", get(get_service).put(revise_service))
}

/// POST /v1/services: Define a service.
#[utoipa::path(
    post,
    path = "/v1/services",
    request_body = ServiceRequest,
    responses(
        (status = 201, description = "Service created"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid prices, tags, or form schema", body = crate::error::ErrorBody),
    ),
    tag = "services"
)]
pub(crate) async fn create_service(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<ServiceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ServiceDefinition>), AppError> {
    require_role(&caller, Role::Admin)?;
    let revision = extract_validated_json(body)?.into_revision()?;
    let service = orchestration::create_service(&state, caller.identity_id, revision).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

/// GET /v1/services: The catalog, by name.
#[utoipa::path(
    get,
    path = "/v1/services",
    responses((status = 200, description = "All services")),
    tag = "services"
)]
pub(crate) async fn list_services(State(state): State<AppState>) -> Json<Vec<ServiceDefinition>> {
    let mut services = state.services.list();
    services.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Json(services)
}

/// GET /v1/services/{id}: Fetch a service.
#[utoipa::path(
    get,
    path = "/v1/services/{id}",
    params(("id" = Uuid, Path, description = "Service ID")),
    responses(
        (status = 200, description = "Service found"),
        (status = 404, description = "Service not found", body = crate::error::ErrorBody),
    ),
    tag = "services"
)]
pub(crate) async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceDefinition>, AppError> {
    Ok(Json(orchestration::service(&state, ServiceId::from_uuid(id))?))
}

/// PUT /v1/services/{id}: Revise a service.
#[utoipa::path(
    put,
    path = "/v1/services/{id}",
    params(("id" = Uuid, Path, description = "Service ID")),
    request_body = ServiceRequest,
    responses(
        (status = 200, description = "Service revised"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 422, description = "Revision removes or reorders existing tags or fields", body = crate::error::ErrorBody),
    ),
    tag = "services"
)]
pub(crate) async fn revise_service(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ServiceRequest>, JsonRejection>,
) -> Result<Json<ServiceDefinition>, AppError> {
    require_role(&caller, Role::Admin)?;
    let revision = extract_validated_json(body)?.into_revision()?;
    let service_id = ServiceId::from_uuid(id);
    let service =
        orchestration::revise_service(&state, caller.identity_id, service_id, revision).await?;
    Ok(Json(service))
}
