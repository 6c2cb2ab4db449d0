//! # Portal Settings API
//!
//! The banner and support number shown to every signed-in user.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use seva_core::Role;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::orchestration;
use crate::state::{AppState, PortalSettings};

const MAX_BROADCAST_LEN: usize = 500;

/// Replace the settings record. Omitted or blank fields are cleared.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub broadcast_message: Option<String>,
    #[serde(default)]
    pub support_phone: Option<String>,
}

impl Validate for UpdateSettingsRequest {
    fn validate(&self) -> Result<(), String> {
        match &self.broadcast_message {
            Some(m) if m.chars().count() > MAX_BROADCAST_LEN => Err(format!(
                "broadcast_message must not exceed {MAX_BROADCAST_LEN} characters"
            )),
            _ => Ok(()),
        }
    }
}

/// Build the settings router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/settings", get(get_settings).put(update_settings))
}

/// GET /v1/settings: Current portal settings.
#[utoipa::path(
    get,
    path = "/v1/settings",
    responses((status = 200, description = "Portal settings", body = PortalSettings)),
    tag = "settings"
)]
pub(crate) async fn get_settings(State(state): State<AppState>) -> Json<PortalSettings> {
    Json(state.settings.read().clone())
}

/// PUT /v1/settings: Replace portal settings.
#[utoipa::path(
    put,
    path = "/v1/settings",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings saved", body = PortalSettings),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "settings"
)]
pub(crate) async fn update_settings(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<UpdateSettingsRequest>, JsonRejection>,
) -> Result<Json<PortalSettings>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let settings = orchestration::update_settings(
        &state,
        caller.identity_id,
        req.broadcast_message,
        req.support_phone,
    )
    .await?;
    Ok(Json(settings))
}
