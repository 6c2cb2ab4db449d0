//! # Service Definitions and Form Schemas
//!
//! A [`ServiceDefinition`] is a catalog offering: two price tiers, an ordered
//! set of required document-type tags, and a form schema. Orders are
//! validated against it at submission time.
//!
//! ## Form schema
//!
//! The schema is an ordered sequence of `{name, label, field_type}`. Every
//! field is a required string; an empty string is accepted (staff may flag
//! it later). `field_type` is presentation metadata only and never gates a
//! core transition.
//!
//! ## Revisions
//!
//! Once orders reference a service, only additive edits are allowed. A
//! revision may append new document tags and form fields and change prices
//! or the name, but every existing tag and field must survive with its
//! relative order and type intact.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{FieldViolation, SevaError, ValidationFailure};
use crate::identity::ServiceId;
use crate::money::Amount;
use crate::person::Role;

// ─── Document tags ───────────────────────────────────────────────────

/// A document-type tag such as `aadhaar` or `photo`.
///
/// Normalized on construction: trimmed, lowercased, non-empty, at most 64
/// characters. Deserialization runs the same validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocTag(String);

impl DocTag {
    pub const MAX_LEN: usize = 64;

    pub fn new(raw: impl AsRef<str>) -> Result<Self, String> {
        let tag = raw.as_ref().trim().to_lowercase();
        if tag.is_empty() {
            return Err("document tag must not be empty".to_string());
        }
        if tag.len() > Self::MAX_LEN {
            return Err(format!(
                "document tag must not exceed {} characters",
                Self::MAX_LEN
            ));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a free-form upload type tag names this tag.
    pub fn matches(&self, type_tag: &str) -> bool {
        type_tag.trim().eq_ignore_ascii_case(&self.0)
    }
}

impl TryFrom<String> for DocTag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocTag> for String {
    fn from(tag: DocTag) -> Self {
        tag.0
    }
}

impl std::fmt::Display for DocTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Form schema ─────────────────────────────────────────────────────

/// Presentation hint for a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormFieldType {
    #[default]
    Text,
    Textarea,
    Number,
    Date,
    Phone,
    Email,
}

/// One entry in a service's form schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub field_type: FormFieldType,
}

impl FormField {
    pub fn text(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            field_type: FormFieldType::Text,
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by service catalog operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("invalid service definition: {0}")]
    Invalid(ValidationFailure),

    #[error("revision of {service_id} is not additive: {detail}")]
    BreakingRevision { service_id: ServiceId, detail: String },
}

impl From<ServiceError> for SevaError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Invalid(failure) => SevaError::ValidationFailed(failure),
            ServiceError::BreakingRevision { .. } => SevaError::validation(err.to_string()),
        }
    }
}

// ─── Service definition ──────────────────────────────────────────────

/// A catalog offering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: ServiceId,
    pub name: String,
    pub price_normal: Amount,
    pub price_b2b: Amount,
    /// Ordered, unique.
    pub required_documents: Vec<DocTag>,
    /// Ordered, unique by field name.
    pub form_schema: Vec<FormField>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The editable part of a service definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRevision {
    pub name: String,
    pub price_normal: Amount,
    pub price_b2b: Amount,
    pub required_documents: Vec<DocTag>,
    pub form_schema: Vec<FormField>,
}

impl ServiceDefinition {
    /// Create a service definition after validating it.
    pub fn new(revision: ServiceRevision) -> Result<Self, ServiceError> {
        validate_revision(&revision)?;
        let now = Utc::now();
        Ok(Self {
            id: ServiceId::new(),
            name: revision.name.trim().to_string(),
            price_normal: revision.price_normal,
            price_b2b: revision.price_b2b,
            required_documents: revision.required_documents,
            form_schema: revision.form_schema,
            created_at: now,
            updated_at: now,
        })
    }

    /// The price charged to a submitter with the given role.
    pub fn price_for(&self, submitter_role: Role) -> Amount {
        match submitter_role {
            Role::B2b => self.price_b2b,
            _ => self.price_normal,
        }
    }

    pub fn requires(&self, tag: &DocTag) -> bool {
        self.required_documents.contains(tag)
    }

    /// Validate submitted form data against the schema.
    ///
    /// Returns one violation per missing field and per unknown field. Empty
    /// strings are accepted.
    pub fn validate_form(&self, form_data: &BTreeMap<String, String>) -> Vec<FieldViolation> {
        let mut violations: Vec<FieldViolation> = self
            .form_schema
            .iter()
            .filter(|field| !form_data.contains_key(&field.name))
            .map(|field| FieldViolation::new(&field.name, "required field missing"))
            .collect();

        let known: HashSet<&str> = self.form_schema.iter().map(|f| f.name.as_str()).collect();
        violations.extend(
            form_data
                .keys()
                .filter(|name| !known.contains(name.as_str()))
                .map(|name| FieldViolation::new(name, "unknown form field")),
        );
        violations
    }

    /// Apply an additive revision.
    pub fn revise(&mut self, revision: ServiceRevision) -> Result<(), ServiceError> {
        validate_revision(&revision)?;

        if !is_ordered_subsequence(&self.required_documents, &revision.required_documents) {
            return Err(ServiceError::BreakingRevision {
                service_id: self.id,
                detail: "existing document tags must be kept in their original order".to_string(),
            });
        }
        if !is_ordered_subsequence(&self.form_schema, &revision.form_schema) {
            return Err(ServiceError::BreakingRevision {
                service_id: self.id,
                detail: "existing form fields must be kept unchanged and in their original order"
                    .to_string(),
            });
        }

        self.name = revision.name.trim().to_string();
        self.price_normal = revision.price_normal;
        self.price_b2b = revision.price_b2b;
        self.required_documents = revision.required_documents;
        self.form_schema = revision.form_schema;
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn validate_revision(revision: &ServiceRevision) -> Result<(), ServiceError> {
    let mut violations = Vec::new();

    if revision.name.trim().is_empty() {
        violations.push(FieldViolation::new("name", "must not be empty"));
    }
    if revision.price_normal.is_negative() {
        violations.push(FieldViolation::new("price_normal", "must not be negative"));
    }
    if revision.price_b2b.is_negative() {
        violations.push(FieldViolation::new("price_b2b", "must not be negative"));
    }

    let mut seen_tags = HashSet::new();
    for tag in &revision.required_documents {
        if !seen_tags.insert(tag) {
            violations.push(FieldViolation::new(
                format!("required_documents.{tag}"),
                "duplicate document tag",
            ));
        }
    }

    let mut seen_fields = HashSet::new();
    for field in &revision.form_schema {
        if field.name.trim().is_empty() {
            violations.push(FieldViolation::new("form_schema", "field name must not be empty"));
        } else if !seen_fields.insert(field.name.as_str()) {
            violations.push(FieldViolation::new(
                format!("form_schema.{}", field.name),
                "duplicate field name",
            ));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Invalid(ValidationFailure::with_fields(
            "service definition rejected",
            violations,
        )))
    }
}

/// Whether every element of `existing` appears in `next` in the same order.
fn is_ordered_subsequence<T: PartialEq>(existing: &[T], next: &[T]) -> bool {
    let mut remaining = next.iter();
    existing
        .iter()
        .all(|item| remaining.by_ref().any(|candidate| candidate == item))
}
