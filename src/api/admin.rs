//! Admin API (port 8081): operator-facing endpoints.
//!
//! Kept on a separate port so it can be network-restricted independently of
//! the public listener. `/metrics` is open to anything that can reach the
//! port; every `/debug/*` route additionally passes the endpoint gate.
//!
//! Unknown paths, wrong methods and gate denials all produce the same empty
//! `404`, so a caller cannot tell a disabled endpoint from a missing one.

use std::sync::Arc;

use axum::{routing::get, Router};

use super::debug_gate::not_found;
use crate::state::AppState;

/// Build the admin-facing axum router (port 8081).
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(super::metrics::metrics))
        .merge(super::debug::router(&state))
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .with_state(state)
}
