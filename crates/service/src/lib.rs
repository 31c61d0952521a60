//! bq account service library.
//!
//! This crate provides the account service as a library, allowing it to be
//! tested and reused.
//!
//! # Modules
//!
//! - [`db`] - Storage Port and its `PostgreSQL` adapter
//! - [`cache`] - Cache Port, its adapters and the background populator
//! - [`identity`] - Identity Provider Port and its Clerk adapter
//! - [`services`] - Read-through listing and the registration saga
//! - [`routes`] - HTTP handlers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

use axum::Router;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the application router with all layers applied.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
