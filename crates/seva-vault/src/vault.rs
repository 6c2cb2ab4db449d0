//! # Document Vault
//!
//! Per-identity collection of reusable documents. The vault owns the
//! document index; bytes live in a [`BlobStore`].
//!
//! Uploading is split in two so a caller with a database can persist the
//! record between the steps:
//!
//! 1. [`Vault::prepare_upload`] validates, enforces the on-behalf rule,
//!    and writes the blob. Nothing is visible in listings yet.
//! 2. [`Vault::commit`] makes the record visible.
//!
//! [`Vault::upload`] does both for callers without a database.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use seva_core::{DocumentId, FieldViolation, Identity, IdentityId, ValidationFailure};

use crate::blob::BlobStore;
use crate::digest::ContentDigest;
use crate::document::{Document, VaultQuery};
use crate::error::VaultError;

const MAX_FILENAME_LEN: usize = 255;
const MAX_TYPE_TAG_LEN: usize = 64;

/// Raw upload input.
#[derive(Debug, Clone, Copy)]
pub struct Upload<'a> {
    pub type_tag: &'a str,
    pub filename: &'a str,
    pub content: &'a [u8],
}

/// The document index plus its blob backend.
#[derive(Debug)]
pub struct Vault {
    blobs: Arc<dyn BlobStore>,
    documents: RwLock<HashMap<DocumentId, Document>>,
    max_upload_bytes: u64,
}

impl Vault {
    pub fn new(blobs: Arc<dyn BlobStore>, max_upload_bytes: u64) -> Self {
        Self {
            blobs,
            documents: RwLock::new(HashMap::new()),
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Validate an upload and write its bytes. The returned record is not
    /// listed until it is passed to [`Vault::commit`].
    ///
    /// Only staff and admins may upload into a vault other than their own.
    pub fn prepare_upload(
        &self,
        uploader: &Identity,
        owner: &Identity,
        upload: Upload<'_>,
    ) -> Result<Document, VaultError> {
        if !uploader.is_active() {
            return Err(VaultError::Revoked(uploader.id));
        }
        if !owner.is_active() {
            return Err(VaultError::Revoked(owner.id));
        }
        if uploader.id != owner.id && !uploader.role.is_staff() {
            return Err(VaultError::OnBehalfNotPermitted {
                uploader: uploader.id,
                owner: owner.id,
            });
        }

        let size = upload.content.len() as u64;
        if size > self.max_upload_bytes {
            return Err(VaultError::TooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }

        let mut violations = Vec::new();
        let type_tag = upload.type_tag.trim().to_lowercase();
        if type_tag.is_empty() {
            violations.push(FieldViolation::new("type_tag", "must not be empty"));
        } else if type_tag.len() > MAX_TYPE_TAG_LEN {
            violations.push(FieldViolation::new(
                "type_tag",
                format!("must not exceed {MAX_TYPE_TAG_LEN} characters"),
            ));
        }
        let filename = base_filename(upload.filename);
        if filename.is_empty() {
            violations.push(FieldViolation::new("filename", "must not be empty"));
        } else if filename.len() > MAX_FILENAME_LEN {
            violations.push(FieldViolation::new(
                "filename",
                format!("must not exceed {MAX_FILENAME_LEN} characters"),
            ));
        }
        if upload.content.is_empty() {
            violations.push(FieldViolation::new("content", "document is empty"));
        }
        if !violations.is_empty() {
            return Err(VaultError::InvalidUpload(ValidationFailure::with_fields(
                "upload rejected",
                violations,
            )));
        }

        let digest = ContentDigest::of(upload.content);
        let storage_uri = self.blobs.put(&digest, upload.content)?;

        Ok(Document {
            id: DocumentId::new(),
            owner_id: owner.id,
            type_tag,
            original_filename: filename.to_string(),
            storage_uri,
            content_digest: digest,
            size_bytes: size,
            uploaded_by: uploader.id,
            uploaded_at: Utc::now(),
        })
    }

    /// Make a prepared document visible. Re-committing the same id is a
    /// no-op.
    pub fn commit(&self, document: Document) {
        tracing::debug!(
            document_id = %document.id,
            owner_id = %document.owner_id,
            type_tag = %document.type_tag,
            "document committed to vault"
        );
        self.documents.write().entry(document.id).or_insert(document);
    }

    /// Prepare and commit in one step.
    pub fn upload(
        &self,
        uploader: &Identity,
        owner: &Identity,
        upload: Upload<'_>,
    ) -> Result<Document, VaultError> {
        let document = self.prepare_upload(uploader, owner, upload)?;
        self.commit(document.clone());
        Ok(document)
    }

    /// Replace the index with records loaded from persistent storage.
    pub fn load(&self, documents: impl IntoIterator<Item = Document>) {
        let mut index = self.documents.write();
        index.clear();
        index.extend(documents.into_iter().map(|d| (d.id, d)));
    }

    pub fn get(&self, id: DocumentId) -> Option<Document> {
        self.documents.read().get(&id).cloned()
    }

    pub fn require(&self, id: DocumentId) -> Result<Document, VaultError> {
        self.get(id).ok_or(VaultError::NotFound(id))
    }

    /// An owner's documents, newest first.
    pub fn list(&self, owner: IdentityId, query: &VaultQuery) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .documents
            .read()
            .values()
            .filter(|d| d.owner_id == owner && query.matches(d))
            .cloned()
            .collect();
        docs.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        docs
    }

    /// Fetch a document's bytes, verifying them against the recorded digest.
    pub fn read_content(&self, id: DocumentId) -> Result<(Document, Vec<u8>), VaultError> {
        let document = self.require(id)?;
        let bytes = self
            .blobs
            .get(&document.content_digest)?
            .ok_or_else(|| VaultError::Integrity {
                id,
                detail: "content missing from blob store".to_string(),
            })?;
        if !document.content_digest.verify(&bytes) {
            tracing::error!(document_id = %id, "stored content does not match recorded digest");
            return Err(VaultError::Integrity {
                id,
                detail: "digest mismatch".to_string(),
            });
        }
        Ok((document, bytes))
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

/// Strip any client-supplied directory components.
fn base_filename(raw: &str) -> &str {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim()
}
