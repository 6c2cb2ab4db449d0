//! # seva-api: Axum API Service for the Seva Portal
//!
//! The counter application: customers (or staff on their behalf) submit
//! orders for government services, staff claim them from a shared pool,
//! request corrections, and deliver. Payment comes out of a prepaid wallet
//! when the order completes.
//!
//! ## API Surface
//!
//! | Prefix                 | Module                    | Domain              |
//! |------------------------|---------------------------|---------------------|
//! | `/v1/orders/*`         | [`routes::orders`]        | Order workflow      |
//! | `/v1/vault/*`          | [`routes::vault`]         | Document vault      |
//! | `/v1/documents/*`      | [`routes::documents`]     | Document content    |
//! | `/v1/wallet/*`         | [`routes::wallet`]        | Wallet ledger       |
//! | `/v1/identities/*`     | [`routes::identities`]    | Identity registry   |
//! | `/v1/services/*`       | [`routes::services`]      | Service catalog     |
//! | `/v1/settings`         | [`routes::settings`]      | Portal settings     |
//! | `/v1/audit/*`          | [`routes::audit`]         | Audit log           |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → RateLimitMiddleware → Handler
//! ```
//!
//! Health probes, `/metrics` and `/openapi.json` are mounted outside the
//! auth middleware.
//!
//! ## Crate Policy
//!
//! - Sits at the top of the dependency DAG.
//! - No business logic in route handlers; they authorize and delegate to
//!   [`orchestration`], which delegates to the domain crates.
//! - All errors map to structured HTTP responses via `AppError`.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod orchestration;
pub mod routes;
pub mod state;

use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};

pub use error::AppError;
pub use state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let limiter = RateLimiter::new(RateLimitConfig {
        max_requests: state.config.rate_limit_per_minute,
        window: Duration::from_secs(60),
    });

    // Authenticated API routes.
    let api = Router::new()
        .merge(routes::orders::router())
        .merge(routes::vault::router(state.config.max_upload_bytes))
        .merge(routes::documents::router())
        .merge(routes::wallet::router())
        .merge(routes::identities::router())
        .merge(routes::services::router())
        .merge(routes::settings::router())
        .merge(routes::audit::router())
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .layer(axum::Extension(limiter))
        .with_state(state.clone());

    // Unauthenticated operational endpoints.
    let ops = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .merge(openapi::router())
        .with_state(state);

    Router::new().merge(ops).merge(api)
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 once the database (if any) answers.
async fn readiness(State(state): State<AppState>) -> Response {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!(error = %e, "readiness check failed: database unreachable");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unavailable").into_response();
        }
    }
    "ready".into_response()
}

/// Prometheus text exposition. Empty when no recorder is installed.
async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}
