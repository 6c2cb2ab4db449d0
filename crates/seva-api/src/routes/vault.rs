//! # Document Vault API
//!
//! Upload into and browse an identity's vault. Uploads carry the raw file
//! bytes as the request body; metadata travels in the query string.

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use seva_core::IdentityId;
use seva_vault::{Document, Upload, VaultQuery};

use crate::auth::{authorize_actor, authorize_reader, CallerIdentity};
use crate::error::AppError;
use crate::extractors::extract_query;
use crate::orchestration;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub type_tag: String,
    pub filename: String,
    /// Defaults to the caller's own identity.
    #[serde(default)]
    pub uploaded_by: Option<Uuid>,
}

/// Build the vault router. Bodies larger than `max_upload_bytes` are
/// refused before they are buffered.
pub fn router(max_upload_bytes: u64) -> Router<AppState> {
    // One byte of headroom so an upload just over the limit reaches the
    // vault and gets its size reported.
    let limit = usize::try_from(max_upload_bytes.saturating_add(1)).unwrap_or(usize::MAX);
    Router::new().route(
        "/v1/vault/{owner_id}/documents",
        post(upload_document)
            .layer(DefaultBodyLimit::max(limit))
            .get(list_documents),
    )
}

/// POST /v1/vault/{owner_id}/documents: Upload a document.
#[utoipa::path(
    post,
    path = "/v1/vault/{owner_id}/documents",
    params(
        ("owner_id" = Uuid, Path, description = "Vault owner"),
        ("type_tag" = String, Query, description = "Document category, e.g. aadhaar"),
        ("filename" = String, Query, description = "Original file name"),
        ("uploaded_by" = Option<Uuid>, Query, description = "Uploader; defaults to the caller"),
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Document stored"),
        (status = 403, description = "Caller may not act as uploader", body = crate::error::ErrorBody),
        (status = 422, description = "Empty, oversized, or uploading for another identity without staff role", body = crate::error::ErrorBody),
    ),
    tag = "vault"
)]
pub(crate) async fn upload_document(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(owner_id): Path<Uuid>,
    query: Result<Query<UploadQuery>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<Document>), AppError> {
    let query = extract_query(query)?;
    let content = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::validation(format!(
                "document exceeds the {} byte upload limit",
                state.vault.max_upload_bytes()
            ))
        } else {
            AppError::BadRequest(rejection.body_text())
        }
    })?;

    let uploader = query
        .uploaded_by
        .map(IdentityId::from_uuid)
        .or(caller.identity_id)
        .ok_or_else(|| AppError::validation("uploaded_by is required"))?;
    authorize_actor(&caller, uploader)?;

    let upload = Upload {
        type_tag: &query.type_tag,
        filename: &query.filename,
        content: &content,
    };
    let document = orchestration::upload_document(
        &state,
        uploader,
        IdentityId::from_uuid(owner_id),
        upload,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /v1/vault/{owner_id}/documents: List an owner's documents.
#[utoipa::path(
    get,
    path = "/v1/vault/{owner_id}/documents",
    params(
        ("owner_id" = Uuid, Path, description = "Vault owner"),
        ("type_tag" = Option<String>, Query, description = "Exact category match"),
        ("q" = Option<String>, Query, description = "Case-insensitive substring of file name or category"),
    ),
    responses(
        (status = 200, description = "Documents, newest first"),
        (status = 404, description = "Owner not found", body = crate::error::ErrorBody),
    ),
    tag = "vault"
)]
pub(crate) async fn list_documents(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(owner_id): Path<Uuid>,
    query: Result<Query<VaultQuery>, QueryRejection>,
) -> Result<Json<Vec<Document>>, AppError> {
    let query = extract_query(query)?;
    let owner = IdentityId::from_uuid(owner_id);
    authorize_reader(&caller, owner)?;
    orchestration::identity(&state, owner)?;
    Ok(Json(state.vault.list(owner, &query)))
}
