//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI 3.1 spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Seva Portal API",
        version = "0.1.0",
        description = "Citizen-services counter: order workflow with staff claim and charge-on-complete, document vault, prepaid wallet ledger, identity registry, and service catalog.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Orders
        crate::routes::orders::create_order,
        crate::routes::orders::list_orders,
        crate::routes::orders::get_order,
        crate::routes::orders::claim_order,
        crate::routes::orders::reject_document,
        crate::routes::orders::reupload_document,
        crate::routes::orders::complete_order,
        crate::routes::orders::reject_order,
        // Vault
        crate::routes::vault::upload_document,
        crate::routes::vault::list_documents,
        // Documents
        crate::routes::documents::get_document,
        crate::routes::documents::get_content,
        // Wallet
        crate::routes::wallet::add_funds,
        crate::routes::wallet::list_transactions,
        crate::routes::wallet::get_balance,
        // Identities
        crate::routes::identities::register_identity,
        crate::routes::identities::find_identities,
        crate::routes::identities::get_identity,
        crate::routes::identities::change_role,
        crate::routes::identities::revoke_identity,
        // Services
        crate::routes::services::create_service,
        crate::routes::services::list_services,
        crate::routes::services::get_service,
        crate::routes::services::revise_service,
        // Settings
        crate::routes::settings::get_settings,
        crate::routes::settings::update_settings,
        // Audit
        crate::routes::audit::resource_events,
        crate::routes::audit::verify_chain,
    ),
    components(schemas(
        crate::state::PortalSettings,
        // Error types
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        // Order DTOs
        crate::routes::orders::CreateOrderRequest,
        crate::routes::orders::ClaimOrderRequest,
        crate::routes::orders::RejectRequest,
        crate::routes::orders::ReuploadRequest,
        crate::routes::orders::CompleteOrderRequest,
        crate::routes::orders::ListFilter,
        // Wallet DTOs
        crate::routes::wallet::AddFundsRequest,
        // Identity DTOs
        crate::routes::identities::RegisterIdentityRequest,
        crate::routes::identities::ChangeRoleRequest,
        // Service DTOs
        crate::routes::services::ServiceRequest,
        // Settings DTOs
        crate::routes::settings::UpdateSettingsRequest,
    )),
    tags(
        (name = "orders", description = "Order submission and staff workflow"),
        (name = "vault", description = "Per-identity document vault"),
        (name = "documents", description = "Document metadata and verified content"),
        (name = "wallet", description = "Prepaid wallet ledger"),
        (name = "identities", description = "Identity registry"),
        (name = "services", description = "Service catalog"),
        (name = "settings", description = "Portal settings"),
        (name = "audit", description = "Hash-chained audit log"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
///
/// Serves the OpenAPI JSON spec at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
