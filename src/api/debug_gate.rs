//! Endpoint-gate middleware for the debug routes.
//!
//! Each debug route carries its own [`GateGuard`] naming the action it
//! performs. The middleware identifies the caller from the
//! `Authorization: Bearer <token>` header, asks the [`EndpointGate`] and either
//! runs the handler or answers with the same empty `404` axum returns for an
//! unknown path. Denials are access decisions, not errors, and are logged as
//! such.
//!
//! [`EndpointGate`]: crate::gate::EndpointGate

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::info;

use crate::{gate::DebugAction, state::AppState};

/// Middleware state: the shared app state plus the action being guarded.
#[derive(Clone)]
pub struct GateGuard {
    state: Arc<AppState>,
    action: DebugAction,
}

impl GateGuard {
    pub fn new(state: &Arc<AppState>, action: DebugAction) -> Self {
        Self {
            state: Arc::clone(state),
            action,
        }
    }
}

/// The response for denied requests and for anything else that must look
/// like a route that does not exist.
pub async fn not_found() -> Response {
    StatusCode::NOT_FOUND.into_response()
}

/// Axum middleware: runs the handler only when the gate allows `guard.action`.
pub async fn debug_gate(State(guard): State<GateGuard>, req: Request, next: Next) -> Response {
    let caller = guard.state.gate.caller_from_headers(req.headers());
    let identity = caller.identity.as_deref().unwrap_or("anonymous");

    match guard.state.gate.authorize(guard.action, &caller) {
        Ok(()) => {
            info!(target: "readyd::access", action = %guard.action, caller = identity, "debug action allowed");
            next.run(req).await
        }
        Err(_denied) => {
            info!(target: "readyd::access", action = %guard.action, caller = identity, "debug action denied");
            not_found().await
        }
    }
}
