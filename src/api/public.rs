//! Public API (port 8080): what load balancers and orchestrators poll.
//!
//! Deliberately small: liveness and readiness only. Metrics and every
//! operator action live on the admin listener.

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::state::AppState;

/// Build the public axum router (port 8080).
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(super::health::healthz))
        .route("/readyz", get(super::health::readyz))
        .with_state(state)
}
