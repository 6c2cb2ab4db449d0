//! # Identities and Roles
//!
//! An [`Identity`] is a person or organization known to the portal. Its
//! [`Role`] decides what it may do (staff actions, admin registry writes) and
//! which price tier its orders are charged at (b2b vs normal).
//!
//! Identities are never hard-deleted. Revocation is a soft flag that keeps
//! the row, and therefore every order and ledger entry that references it,
//! intact for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{FieldViolation, SevaError, ValidationFailure};
use crate::identity::IdentityId;

/// Roles in the portal, ordered by privilege level.
///
/// `Customer < B2b < Staff < Admin`. The ordering drives `>=` access checks;
/// b2b differs from customer only in its price tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Citizen applying for services at the normal price.
    Customer,
    /// Business partner applying on behalf of clients at the b2b price.
    B2b,
    /// Verifies documents and completes orders.
    Staff,
    /// Manages the identity registry and service catalog.
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::B2b => "b2b",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }

    /// Staff and admins may verify documents and act on behalf of others.
    pub fn is_staff(&self) -> bool {
        *self >= Role::Staff
    }

    /// Parse the wire representation.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "customer" => Some(Self::Customer),
            "b2b" => Some(Self::B2b),
            "staff" => Some(Self::Staff),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by identity registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid identity profile: {0}")]
    InvalidProfile(ValidationFailure),

    #[error("phone number {phone} is already registered")]
    DuplicatePhone { phone: String },

    #[error("identity {id} has been revoked")]
    Revoked { id: IdentityId },
}

impl From<IdentityError> for SevaError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidProfile(failure) => SevaError::ValidationFailed(failure),
            IdentityError::DuplicatePhone { .. } => SevaError::StateConflict(err.to_string()),
            IdentityError::Revoked { .. } => SevaError::StateConflict(err.to_string()),
        }
    }
}

/// A registered person or organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub name: String,
    /// Unique across the registry.
    pub phone: String,
    #[serde(default)]
    pub father_name: Option<String>,
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    pub role: Role,
    /// Set when the identity is soft-revoked.
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Build a new identity after validating the profile fields.
    pub fn register(
        name: &str,
        phone: &str,
        role: Role,
        father_name: Option<String>,
        village: Option<String>,
    ) -> Result<Self, IdentityError> {
        let mut violations = Vec::new();
        let name = name.trim();
        if name.is_empty() {
            violations.push(FieldViolation::new("name", "must not be empty"));
        }
        let phone = normalize_phone(phone);
        if let Err(problem) = validate_phone(&phone) {
            violations.push(FieldViolation::new("phone", problem));
        }
        if !violations.is_empty() {
            return Err(IdentityError::InvalidProfile(ValidationFailure::with_fields(
                "identity registration rejected",
                violations,
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: IdentityId::new(),
            name: name.to_string(),
            phone,
            father_name: father_name.filter(|s| !s.trim().is_empty()),
            village: village.filter(|s| !s.trim().is_empty()),
            profile_image: None,
            role,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }

    /// Fail with [`IdentityError::Revoked`] if the identity is revoked.
    pub fn require_active(&self) -> Result<(), IdentityError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(IdentityError::Revoked { id: self.id })
        }
    }

    /// Change the role. Revoked identities keep their role frozen.
    pub fn change_role(&mut self, role: Role) -> Result<(), IdentityError> {
        self.require_active()?;
        self.role = role;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Soft-revoke. Idempotent: revoking twice keeps the first timestamp.
    pub fn revoke(&mut self) {
        if self.revoked_at.is_none() {
            let now = Utc::now();
            self.revoked_at = Some(now);
            self.updated_at = now;
        }
    }
}

/// Strip spaces and dashes that users commonly type into phone numbers.
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if digits.is_empty() {
        return Err("must not be empty");
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("must contain digits only");
    }
    if !(7..=15).contains(&digits.len()) {
        return Err("must be between 7 and 15 digits");
    }
    Ok(())
}
