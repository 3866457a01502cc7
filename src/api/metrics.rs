//! Prometheus-compatible `/metrics` endpoint.
//!
//! Rendered from the cached readiness verdict only; scraping never triggers a
//! probe run. Before the first cycle completes the per-probe families are
//! empty and `readyd_ready` reports `0`.
//!
//! Metric families:
//! - `readyd_ready`               : 1 when the last verdict was healthy
//! - `readyd_probe_healthy`       : per-probe outcome of the last cycle
//! - `readyd_probe_latency_ms`    : per-probe latency of the last cycle
//! - `readyd_verdict_age_seconds` : age of the cached verdict
//! - `readyd_refresh_cycles`      : refresh cycles run since start
//! - `readyd_uptime_seconds`      : process uptime

use std::{fmt::Write as _, sync::Arc};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::{readiness::ReadinessVerdict, state::AppState};

/// `GET /metrics`: renders Prometheus text format.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let out = render(
        state.readiness.current().as_deref(),
        state.readiness.cycles(),
        state.started_at.elapsed().as_secs_f64(),
    );

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        out,
    )
}

fn render(verdict: Option<&ReadinessVerdict>, cycles: u64, uptime_secs: f64) -> String {
    let mut out = String::with_capacity(1024);

    let ready = verdict.is_some_and(|v| v.overall_healthy);
    family(&mut out, "readyd_ready", "1 when every dependency probe passed in the last cycle.");
    let _ = writeln!(out, "readyd_ready {}\n", u8::from(ready));

    family(&mut out, "readyd_probe_healthy", "Outcome of each probe in the last cycle.");
    if let Some(v) = verdict {
        // BTreeMap keeps label order stable between scrapes.
        for r in v.results.values() {
            let _ = writeln!(
                out,
                "readyd_probe_healthy{{probe=\"{}\"}} {}",
                escape(&r.probe_name),
                u8::from(r.healthy)
            );
        }
    }
    out.push('\n');

    family(&mut out, "readyd_probe_latency_ms", "Latency of each probe in the last cycle.");
    if let Some(v) = verdict {
        for r in v.results.values() {
            let _ = writeln!(
                out,
                "readyd_probe_latency_ms{{probe=\"{}\"}} {}",
                escape(&r.probe_name),
                r.latency.as_millis()
            );
        }
    }
    out.push('\n');

    if let Some(v) = verdict {
        family(&mut out, "readyd_verdict_age_seconds", "Seconds since the cached verdict was produced.");
        let _ = writeln!(out, "readyd_verdict_age_seconds {:.3}\n", v.age().as_secs_f64());
    }

    family(&mut out, "readyd_refresh_cycles", "Readiness refresh cycles run since start.");
    let _ = writeln!(out, "readyd_refresh_cycles {cycles}\n");

    family(&mut out, "readyd_uptime_seconds", "Seconds since the process started.");
    let _ = writeln!(out, "readyd_uptime_seconds {uptime_secs:.3}");

    out
}

fn family(out: &mut String, name: &str, help: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
}

/// Label values must escape backslash, quote and newline.
fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt; // oneshot

    use crate::{
        config::Config,
        probe::{check_fn, CheckStatus, Probe, RegistryBuilder},
        readiness::ReadinessEvaluator,
        state::AppState,
    };

    fn state() -> Arc<AppState> {
        let mut builder = RegistryBuilder::new();
        builder
            .register(Probe::new("postgres", Duration::from_secs(1), check_fn(|_| async {
                Ok(CheckStatus::healthy())
            })))
            .unwrap()
            .register(Probe::new("rabbitmq", Duration::from_secs(1), check_fn(|_| async {
                Err(anyhow::anyhow!("connection refused"))
            })))
            .unwrap();
        let evaluator = ReadinessEvaluator::new(builder.build(), Duration::from_secs(60));
        Arc::new(AppState::new(&Config::default(), Arc::new(evaluator), None))
    }

    async fn scrape(state: Arc<AppState>) -> String {
        let resp = crate::api::admin::router(state)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain; version=0.0.4"));
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn scrape_before_first_cycle_runs_no_probe() {
        let state = state();
        let text = scrape(Arc::clone(&state)).await;

        assert!(text.contains("readyd_ready 0"));
        assert!(!text.contains("readyd_probe_healthy{"));
        assert!(!text.contains("readyd_verdict_age_seconds"));
        assert_eq!(state.readiness.cycles(), 0);
    }

    #[tokio::test]
    async fn scrape_reflects_last_verdict() {
        let state = state();
        state.readiness.evaluate().await;
        let text = scrape(state).await;

        assert!(text.contains("readyd_ready 0"));
        assert!(text.contains("readyd_probe_healthy{probe=\"postgres\"} 1"));
        assert!(text.contains("readyd_probe_healthy{probe=\"rabbitmq\"} 0"));
        assert!(text.contains("readyd_probe_latency_ms{probe=\"postgres\"}"));
        assert!(text.contains("readyd_refresh_cycles 1"));
        assert!(text.contains("# TYPE readyd_uptime_seconds gauge"));
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(super::escape(r#"a"b\c"#), r#"a\"b\\c"#);
    }
}
