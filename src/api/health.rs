//! Liveness and readiness endpoints.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::{probe::TIMEOUT_DETAIL, readiness::ProbeResult, state::AppState};

/// `GET /healthz`: always returns 200 OK with `{"status": "ok"}`.
///
/// This endpoint has no dependencies and never blocks, making it safe to use
/// as a Docker / Kubernetes liveness probe.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// `GET /readyz`: 200 when every dependency probe passes, 503 otherwise.
///
/// Served from the evaluator's cache while it is fresh. The failure body lists
/// unhealthy probes by name with a coarse reason only; the raw detail is
/// available through the gated `/debug/readiness` endpoint.
///
/// ```json
/// {
///   "status": "not_ready",
///   "unhealthy": [{ "probe": "postgres", "reason": "timeout" }]
/// }
/// ```
pub async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let verdict = state.readiness.evaluate().await;

    if verdict.overall_healthy {
        return (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "probes": verdict.results.len(),
            })),
        );
    }

    let unhealthy: Vec<Value> = verdict
        .unhealthy()
        .map(|r| json!({ "probe": r.probe_name, "reason": public_reason(r) }))
        .collect();

    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "status": "not_ready",
            "unhealthy": unhealthy,
        })),
    )
}

fn public_reason(result: &ProbeResult) -> &'static str {
    if result.detail.as_deref() == Some(TIMEOUT_DETAIL) {
        "timeout"
    } else {
        "unhealthy"
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt; // oneshot

    use crate::{
        config::Config,
        probe::{check_fn, CheckStatus, Probe, ProbeRegistry, RegistryBuilder},
        readiness::ReadinessEvaluator,
        state::AppState,
    };

    // -----------------------------------------------------------------------
    // Test helpers
    // -----------------------------------------------------------------------

    fn state_with(probes: Vec<Probe>) -> Arc<AppState> {
        let mut builder = RegistryBuilder::new();
        for p in probes {
            builder.register(p).unwrap();
        }
        let evaluator = ReadinessEvaluator::new(builder.build(), Duration::from_secs(60));
        Arc::new(AppState::new(&Config::default(), Arc::new(evaluator), None))
    }

    fn probe(name: &str, outcome: fn() -> anyhow::Result<CheckStatus>) -> Probe {
        Probe::new(name, Duration::from_secs(1), check_fn(move |_| async move { outcome() }))
    }

    async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let app = crate::api::public::router(state);
        let resp = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    // -----------------------------------------------------------------------
    // GET /healthz
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn healthz_ignores_dependency_state() {
        let state = state_with(vec![probe("db", || Err(anyhow::anyhow!("down")))]);
        let (status, json) = get(state, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    // -----------------------------------------------------------------------
    // GET /readyz
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn readyz_ok_with_no_probes() {
        let state = Arc::new(AppState::new(
            &Config::default(),
            Arc::new(ReadinessEvaluator::new(ProbeRegistry::empty(), Duration::from_secs(1))),
            None,
        ));
        let (status, json) = get(state, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ready");
        assert_eq!(json["probes"], 0);
    }

    #[tokio::test]
    async fn readyz_ok_when_all_probes_pass() {
        let state = state_with(vec![
            probe("db", || Ok(CheckStatus::healthy())),
            probe("broker", || Ok(CheckStatus::healthy())),
        ]);
        let (status, json) = get(state, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["probes"], 2);
    }

    #[tokio::test]
    async fn readyz_503_lists_unhealthy_probes_without_raw_detail() {
        let state = state_with(vec![
            probe("db", || Err(anyhow::anyhow!("password authentication failed for user svc"))),
            probe("broker", || Ok(CheckStatus::healthy())),
        ]);
        let (status, json) = get(state, "/readyz").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "not_ready");
        let unhealthy = json["unhealthy"].as_array().unwrap();
        assert_eq!(unhealthy.len(), 1);
        assert_eq!(unhealthy[0]["probe"], "db");
        assert_eq!(unhealthy[0]["reason"], "unhealthy");
        assert!(
            !json.to_string().contains("password"),
            "raw probe error leaked: {json}"
        );
    }

    #[tokio::test]
    async fn readyz_reports_timeout_reason() {
        let hanging = Probe::new(
            "slow",
            Duration::from_millis(30),
            check_fn(|_| futures_util::future::pending()),
        );
        let (status, json) = get(state_with(vec![hanging]), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["unhealthy"][0]["reason"], "timeout");
    }

    #[tokio::test]
    async fn readyz_serves_cached_verdict_within_ttl() {
        static RUNS: AtomicUsize = AtomicUsize::new(0);
        let counted = Probe::new("db", Duration::from_secs(1), check_fn(|_| async {
            RUNS.fetch_add(1, Ordering::SeqCst);
            Ok(CheckStatus::healthy())
        }));
        let state = state_with(vec![counted]);

        get(Arc::clone(&state), "/readyz").await;
        get(Arc::clone(&state), "/readyz").await;
        assert_eq!(RUNS.load(Ordering::SeqCst), 1);
    }
}
