//! # seva-vault: Document Vault
//!
//! Stores uploaded documents once and lets orders cite them by id. A
//! document is immutable: re-uploading a corrected scan creates a new
//! record, and the order is relinked to it.
//!
//! Bytes are content-addressed by SHA-256 and verified on every read.

pub mod blob;
pub mod digest;
pub mod document;
pub mod error;
pub mod vault;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use digest::ContentDigest;
pub use document::{Document, VaultQuery};
pub use error::VaultError;
pub use vault::{Upload, Vault};
