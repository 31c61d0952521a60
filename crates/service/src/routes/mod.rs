//! HTTP route handlers for the account service.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (storage ping)
//!
//! # Accounts
//! GET  /accounts               - List accounts (cache first)
//! POST /accounts               - Register an account
//! ```

pub mod accounts;
pub mod health;

use axum::{Router, routing::get};

use crate::state::AppState;

/// Create the account routes router.
pub fn routes() -> Router<AppState> {
    Router::new().route("/accounts", get(accounts::list).post(accounts::register))
}

/// Create the health check router.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
}
