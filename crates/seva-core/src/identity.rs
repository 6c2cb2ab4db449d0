//! # Domain Identifier Newtypes
//!
//! Newtype wrappers for every identifier in the portal. These prevent
//! accidental identifier confusion: you cannot pass an `OrderId` where a
//! `DocumentId` is expected, and the vault cannot be asked for a document
//! by an identity id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_identifier!(
    /// Unique identifier for a person or organization (customer, b2b, staff, admin).
    IdentityId,
    "identity"
);

uuid_identifier!(
    /// Unique identifier for a catalog service offering.
    ServiceId,
    "service"
);

uuid_identifier!(
    /// Unique identifier for a service application (order).
    OrderId,
    "order"
);

uuid_identifier!(
    /// Unique identifier for a stored document.
    DocumentId,
    "document"
);

uuid_identifier!(
    /// Unique identifier for a wallet ledger transaction.
    TransactionId,
    "txn"
);
