//! Append-only, proof-of-work sealed ledger of email-send records.
//!
//! Records are queued, drained into a candidate block that references the
//! chain tip, sealed by a nonce search until the SHA-256 hex digest carries the
//! configured number of leading zeros, and appended. Validation re-derives
//! every digest and link.

pub mod config;
pub mod error;
pub mod ledger;
pub mod miner;
pub mod model;
pub mod pending;
pub mod routes;
pub mod service;

use axum::Router;
use tower_http::trace::TraceLayer;

use service::LedgerService;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerService,
}

impl AppState {
    pub fn new(ledger: LedgerService) -> Self {
        Self { ledger }
    }
}

/// Full HTTP application with request tracing.
pub fn app(state: AppState) -> Router {
    routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
