//! Document index persistence (`documents` table). Rows are insert-only.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use seva_core::{DocumentId, IdentityId};
use seva_vault::{ContentDigest, Document};

use super::{to_i64, to_u64};

pub async fn insert(conn: &mut PgConnection, document: &Document) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO documents (id, owner_id, type_tag, original_filename, storage_uri,
         content_digest, size_bytes, uploaded_by, uploaded_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(document.id.0)
    .bind(document.owner_id.0)
    .bind(&document.type_tag)
    .bind(&document.original_filename)
    .bind(&document.storage_uri)
    .bind(document.content_digest.to_hex())
    .bind(to_i64(document.size_bytes, "documents.size_bytes")?)
    .bind(document.uploaded_by.0)
    .bind(document.uploaded_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<Document>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DocumentRow>(
        "SELECT id, owner_id, type_tag, original_filename, storage_uri, content_digest,
         size_bytes, uploaded_by, uploaded_at
         FROM documents ORDER BY uploaded_at",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(DocumentRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    owner_id: Uuid,
    type_tag: String,
    original_filename: String,
    storage_uri: String,
    content_digest: String,
    size_bytes: i64,
    uploaded_by: Uuid,
    uploaded_at: DateTime<Utc>,
}

impl DocumentRow {
    fn into_record(self) -> Result<Document, sqlx::Error> {
        let content_digest =
            ContentDigest::from_hex(&self.content_digest).map_err(|e| sqlx::Error::ColumnDecode {
                index: "documents.content_digest".to_string(),
                source: e.into(),
            })?;
        Ok(Document {
            id: DocumentId::from_uuid(self.id),
            owner_id: IdentityId::from_uuid(self.owner_id),
            type_tag: self.type_tag,
            original_filename: self.original_filename,
            storage_uri: self.storage_uri,
            content_digest,
            size_bytes: to_u64(self.size_bytes, "documents.size_bytes")?,
            uploaded_by: IdentityId::from_uuid(self.uploaded_by),
            uploaded_at: self.uploaded_at,
        })
    }
}
