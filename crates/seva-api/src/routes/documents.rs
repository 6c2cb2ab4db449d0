//! # Documents API
//!
//! Read access to individual vault documents by id. Content is verified
//! against the recorded SHA-256 digest on every read; a mismatch is a
//! storage failure, never silently served.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use seva_core::{DocumentId, SevaError};
use seva_vault::Document;

use crate::auth::{authorize_reader, CallerIdentity};
use crate::error::AppError;
use crate::orchestration;
use crate::state::AppState;

/// Response header carrying the hex content digest.
pub const CONTENT_DIGEST_HEADER: &str = "x-content-sha256";

/// Build the documents router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/documents/{id}", get(get_document))
        .route("/v1/documents/{id}/content", get(get_content))
}

/// GET /v1/documents/{id}: Document metadata.
#[utoipa::path(
    get,
    path = "/v1/documents/{id}",
    params(("id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document metadata"),
        (status = 404, description = "Document not found", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
pub(crate) async fn get_document(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, AppError> {
    let document = orchestration::document(&state, DocumentId::from_uuid(id))?;
    authorize_reader(&caller, document.owner_id)?;
    Ok(Json(document))
}

/// GET /v1/documents/{id}/content: Document bytes.
#[utoipa::path(
    get,
    path = "/v1/documents/{id}/content",
    params(("id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document content", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 404, description = "Document not found", body = crate::error::ErrorBody),
        (status = 503, description = "Content missing or failed its integrity check", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
pub(crate) async fn get_content(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let id = DocumentId::from_uuid(id);
    let document = orchestration::document(&state, id)?;
    authorize_reader(&caller, document.owner_id)?;

    let (document, bytes) = state.vault.read_content(id).map_err(SevaError::from)?;
    let filename: String = document
        .original_filename
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();
    let disposition = format!("attachment; filename=\"{filename}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (
                header::HeaderName::from_static(CONTENT_DIGEST_HEADER),
                document.content_digest.to_hex(),
            ),
        ],
        bytes,
    )
        .into_response())
}
