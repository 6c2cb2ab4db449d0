//! # Route Modules
//!
//! Each module defines an Axum Router for one API surface area.
//! Routers are assembled in `lib.rs` into the application. Handlers check
//! who the caller is and who they act as, then hand off to
//! [`crate::orchestration`].

pub mod audit;
pub mod documents;
pub mod identities;
pub mod orders;
pub mod services;
pub mod settings;
pub mod vault;
pub mod wallet;
