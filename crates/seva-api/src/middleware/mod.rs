//! # Middleware
//!
//! Tower/axum middleware applied to the `/v1` API surface: Prometheus
//! request metrics and per-caller rate limiting.

pub mod metrics;
pub mod rate_limit;
