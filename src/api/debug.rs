//! Operator debug endpoints, every one behind the endpoint gate.
//!
//! | Route                              | Action              |
//! |------------------------------------|---------------------|
//! | `POST /debug/reset/database`       | `reset_database`    |
//! | `POST /debug/reset/cache`          | `reset_cache`       |
//! | `PUT  /debug/log-level`            | `set_log_level`     |
//! | `POST /debug/gc`                   | `force_gc`          |
//! | `POST /debug/readiness/refresh`    | `refresh_readiness` |
//! | `GET  /debug/readiness`            | `diagnostics`       |
//! | `POST /debug/alert`                | `test_alert`        |
//!
//! `/debug/alert` is only registered when an alert reporter exists.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put, MethodRouter},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{
    debug_gate::{debug_gate, GateGuard},
    request_id::RequestId,
};
use crate::{error::AppError, gate::DebugAction, hooks::OperatorHooks, state::AppState};

/// Debug routes, each wrapped in its own gate layer.
pub fn router(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    let gated = |action: DebugAction, route: MethodRouter<Arc<AppState>>| {
        route.route_layer(middleware::from_fn_with_state(
            GateGuard::new(state, action),
            debug_gate,
        ))
    };

    let mut router = Router::new()
        .route(
            "/debug/reset/database",
            gated(DebugAction::ResetDatabase, post(reset_database)),
        )
        .route("/debug/reset/cache", gated(DebugAction::ResetCache, post(reset_cache)))
        .route("/debug/log-level", gated(DebugAction::SetLogLevel, put(set_log_level)))
        .route("/debug/gc", gated(DebugAction::ForceGc, post(force_gc)))
        .route(
            "/debug/readiness/refresh",
            gated(DebugAction::RefreshReadiness, post(refresh_readiness)),
        )
        .route("/debug/readiness", gated(DebugAction::Diagnostics, get(diagnostics)));

    if state.reporter.is_some() {
        router = router.route("/debug/alert", gated(DebugAction::TestAlert, post(test_alert)));
    }

    router
}

/// POST /debug/reset/database
pub async fn reset_database(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    installed_hooks(&state, DebugAction::ResetDatabase)?
        .reset_database()
        .await
        .context("resetting database")?;
    Ok(Json(json!({ "status": "ok", "action": DebugAction::ResetDatabase })))
}

/// POST /debug/reset/cache
pub async fn reset_cache(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    installed_hooks(&state, DebugAction::ResetCache)?
        .reset_cache()
        .await
        .context("resetting cache")?;
    Ok(Json(json!({ "status": "ok", "action": DebugAction::ResetCache })))
}

fn installed_hooks(state: &AppState, action: DebugAction) -> Result<&dyn OperatorHooks, AppError> {
    state.hooks.as_deref().ok_or_else(|| {
        AppError::with_status(
            StatusCode::NOT_IMPLEMENTED,
            anyhow::anyhow!("{action}: no operator hook installed"),
        )
    })
}

#[derive(Deserialize)]
pub struct LogLevelRequest {
    /// `EnvFilter` directives, e.g. `"readyd=debug,tower_http=info"`.
    filter: String,
}

/// PUT /debug/log-level: swap the live log filter.
pub async fn set_log_level(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogLevelRequest>,
) -> Result<impl IntoResponse, AppError> {
    let control = state.log_control.as_ref().ok_or_else(|| {
        AppError::with_status(
            StatusCode::SERVICE_UNAVAILABLE,
            anyhow::anyhow!("log level control is not available"),
        )
    })?;
    control
        .set_filter(&req.filter)
        .map_err(|e| AppError::with_status(StatusCode::UNPROCESSABLE_ENTITY, e))?;

    info!(filter = %req.filter, "log filter changed");
    Ok(Json(json!({ "status": "ok", "filter": control.current() })))
}

/// POST /debug/gc: release cached readiness state. The next readiness
/// request re-probes every dependency.
pub async fn force_gc(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let released = state.readiness.invalidate();
    info!(released, "cached readiness verdict dropped");
    Json(json!({ "status": "ok", "released_verdict": released }))
}

/// POST /debug/readiness/refresh: re-probe now, ignoring the cache TTL.
pub async fn refresh_readiness(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let verdict = state.readiness.force_refresh().await;
    Json(verdict.as_ref().clone())
}

/// GET /debug/readiness: full verdict including raw probe details.
pub async fn diagnostics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let verdict = state.readiness.evaluate().await;
    Json(verdict.as_ref().clone())
}

/// POST /debug/alert: send a test alert through the reporter.
///
/// Always `200`: a failed report is still a well-formed [`AlertReport`] with
/// `reported = false`.
///
/// [`AlertReport`]: crate::alert::AlertReport
pub async fn test_alert(
    State(state): State<Arc<AppState>>,
    request_id: Option<Extension<RequestId>>,
) -> impl IntoResponse {
    let Some(reporter) = &state.reporter else {
        return super::debug_gate::not_found().await;
    };

    let mut context = reporter.context().with_tag("trigger", "debug_endpoint");
    if let Some(Extension(id)) = request_id {
        context = context.with_request_id(id.as_str());
    }

    let report = reporter
        .report(&anyhow::anyhow!("test alert triggered by operator"), context)
        .await;
    Json(report).into_response()
}
