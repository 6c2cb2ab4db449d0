//! Document records and vault queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use seva_core::{DocumentId, IdentityId};

use crate::digest::ContentDigest;

/// A stored document. Immutable once written; corrections create a new
/// document rather than editing this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner_id: IdentityId,
    /// Free-form at upload time, trimmed and lowercased.
    pub type_tag: String,
    pub original_filename: String,
    pub storage_uri: String,
    pub content_digest: ContentDigest,
    pub size_bytes: u64,
    pub uploaded_by: IdentityId,
    pub uploaded_at: DateTime<Utc>,
}

/// Filters for listing an owner's vault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultQuery {
    /// Exact type tag match, case-insensitive.
    #[serde(default)]
    pub type_tag: Option<String>,
    /// Case-insensitive substring of the filename or type tag.
    #[serde(default)]
    pub q: Option<String>,
}

impl VaultQuery {
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(tag) = self.type_tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            if !doc.type_tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(q) = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let needle = q.to_lowercase();
            return doc.original_filename.to_lowercase().contains(&needle)
                || doc.type_tag.contains(&needle);
        }
        true
    }
}
