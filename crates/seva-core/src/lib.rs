//! # seva-core: Foundational Types for the Seva Portal
//!
//! The leaf of the workspace dependency graph. Defines the primitives every
//! other crate shares: identifier newtypes, the identity record and its role,
//! integer money amounts, service definitions with their form schemas, and
//! the error taxonomy surfaced at the API boundary.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `IdentityId`, `OrderId`,
//!    `DocumentId`, `ServiceId`, `TransactionId` are distinct types. An order
//!    id cannot be passed where a document id is expected.
//!
//! 2. **Integer money.** `Amount` counts minor units (paise). Floats never
//!    represent money anywhere in the stack.
//!
//! 3. **Schema-driven forms.** A service's form is data, validated against a
//!    name → string map. The core never hard-codes field names.
//!
//! 4. **One error taxonomy.** Every guard failure in the workspace converts
//!    into [`SevaError`], whose five kinds map 1:1 onto API responses.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `seva-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod money;
pub mod person;
pub mod service;

pub use error::{FieldViolation, SevaError, ValidationFailure};
pub use identity::{DocumentId, IdentityId, OrderId, ServiceId, TransactionId};
pub use money::Amount;
pub use person::{normalize_phone, Identity, IdentityError, Role};
pub use service::{
    DocTag, FormField, FormFieldType, ServiceDefinition, ServiceError, ServiceRevision,
};
