use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};

use readyd::{
    alert, api, config::Config, observability, probe::ProbeRegistry, readiness::ReadinessEvaluator,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // When invoked as a Docker HEALTHCHECK, hit /healthz and exit immediately.
    // This avoids needing any external tool (curl/wget) in the container image.
    if std::env::args().nth(1).as_deref() == Some("--healthcheck") {
        return healthcheck().await;
    }

    // Load config before tracing: the log format lives in it.
    let config_path = std::env::var("READYD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/etc/readyd/config.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let log_control = observability::init(config.server.log_level.as_deref(), config.server.log_format);

    info!(
        port = config.server.port,
        admin_port = config.server.admin_port,
        probes = config.probes.len(),
        debug_endpoints = config.debug.enabled,
        reporting = %config.reporting.mode,
        "readyd starting"
    );

    // A bad probe list is a deployment error; refuse to start.
    let registry = ProbeRegistry::from_config(&config.probes).context("building probe registry")?;
    let readiness = Arc::new(ReadinessEvaluator::new(registry, config.readiness.cache_ttl()));
    info!(
        probes = readiness.probe_count(),
        cache_ttl_ms = readiness.ttl().as_millis() as u64,
        "readiness evaluator ready"
    );

    let reporter = alert::init(&config.reporting).await?;

    let state = Arc::new(AppState::new(&config, Arc::clone(&readiness), reporter).with_log_control(log_control));

    if !state.gate.is_enabled() {
        info!("debug endpoints disabled");
    }

    // Warm the cache so the first /readyz is served without waiting on probes.
    tokio::spawn({
        let readiness = Arc::clone(&readiness);
        async move {
            let verdict = readiness.evaluate().await;
            if !verdict.overall_healthy {
                warn!(unhealthy = verdict.unhealthy().count(), "not ready after startup probe cycle");
            }
        }
    });

    let public_addr: SocketAddr = format!("0.0.0.0:{}", config.server.port).parse()?;
    let admin_addr: SocketAddr = format!("0.0.0.0:{}", config.server.admin_port).parse()?;

    let public_listener = tokio::net::TcpListener::bind(public_addr)
        .await
        .with_context(|| format!("binding public listener on {public_addr}"))?;
    let admin_listener = tokio::net::TcpListener::bind(admin_addr)
        .await
        .with_context(|| format!("binding admin listener on {admin_addr}"))?;

    info!(%public_addr, "public API listening");
    info!(%admin_addr, "admin API listening");

    // Attach request tracing middleware to both servers
    let trace_layer = || {
        tower_http::trace::TraceLayer::new_for_http()
            .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
            .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO))
    };

    let public_app = api::public::router(Arc::clone(&state))
        .layer(axum::middleware::from_fn(api::request_id::request_id_middleware))
        .layer(trace_layer());
    let admin_app = api::admin::router(Arc::clone(&state))
        .layer(axum::middleware::from_fn(api::request_id::request_id_middleware))
        .layer(trace_layer());

    tokio::select! {
        result = axum::serve(public_listener, public_app) => {
            result.context("public API server error")?;
        }
        result = axum::serve(admin_listener, admin_app) => {
            result.context("admin API server error")?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Lightweight healthcheck: GET /healthz and exit 0 on 200, 1 otherwise.
/// Invoked via `readyd --healthcheck` from Docker HEALTHCHECK.
async fn healthcheck() -> anyhow::Result<()> {
    let port = std::env::var("READYD_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);

    let url = format!("http://127.0.0.1:{port}/healthz");
    let resp = reqwest::get(&url).await?;

    if resp.status().is_success() {
        std::process::exit(0);
    } else {
        std::process::exit(1);
    }
}
