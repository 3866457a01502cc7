//! Error-reporting adapter.
//!
//! [`AlertReporter::report`] wraps a [`ReportingClient`] and always returns a
//! fully-populated [`AlertReport`]. The upstream call can yield a usable event
//! id, an event without one, nothing at all, an error, a timeout or a panic;
//! only the first counts as reported, everything else collapses into the
//! fallback report. The upstream result is treated as optional at every level
//! and checked before any field is read.
//!
//! [`init`] applies `reporting.mode` at startup: `off` builds nothing,
//! `optional` logs backend problems and carries on, `required` refuses to
//! start without a reachable backend.

use std::{collections::BTreeMap, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use anyhow::Context;
use chrono::Utc;
use futures_util::{future::BoxFuture, FutureExt};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::{ReportingConfig, ReportingMode};

/// Message used whenever no upstream event id is available.
pub const FALLBACK_MESSAGE: &str = "alert not reported: reporting backend returned no event id";

/// Normalized result of a report attempt. `message` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertReport {
    pub event_id: Option<String>,
    pub reported: bool,
    pub message: String,
}

impl AlertReport {
    fn reported(event_id: String) -> Self {
        Self {
            message: format!("alert reported: {event_id}"),
            event_id: Some(event_id),
            reported: true,
        }
    }

    fn fallback() -> Self {
        Self {
            event_id: None,
            reported: false,
            message: FALLBACK_MESSAGE.to_owned(),
        }
    }
}

/// Extra fields attached to a reported event.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertContext {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl AlertContext {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// What the upstream backend hands back for a captured event. Every field is
/// optional because backends are free to omit them.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct UpstreamEvent {
    #[serde(default, alias = "event_id")]
    pub id: Option<String>,
}

/// Reasons an upstream call produced nothing usable. Logged, never returned
/// to callers of [`AlertReporter::report`].
#[derive(Debug, thiserror::Error)]
pub enum ReportingUnavailable {
    #[error("reporting backend did not answer within {0:?}")]
    Timeout(Duration),
    #[error("reporting backend failed: {0}")]
    Backend(String),
    #[error("reporting client panicked")]
    Panicked,
}

/// The third-party error-reporting capability.
pub trait ReportingClient: Send + Sync + 'static {
    /// Submit one event. `Ok(None)` means the backend accepted the call but
    /// returned no result.
    fn capture(
        &self,
        message: String,
        context: AlertContext,
    ) -> BoxFuture<'static, anyhow::Result<Option<UpstreamEvent>>>;

    /// Confirm the backend is reachable and accepts our credentials.
    fn verify(&self) -> BoxFuture<'static, anyhow::Result<()>>;
}

#[derive(Clone)]
pub struct AlertReporter {
    client: Arc<dyn ReportingClient>,
    timeout: Duration,
    source: String,
}

impl AlertReporter {
    pub fn new(client: impl ReportingClient, timeout: Duration, source: impl Into<String>) -> Self {
        Self {
            client: Arc::new(client),
            timeout,
            source: source.into(),
        }
    }

    /// A context pre-filled with this reporter's `source`.
    pub fn context(&self) -> AlertContext {
        AlertContext::new(&self.source)
    }

    /// Report `err`. Never fails and never panics.
    pub async fn report(&self, err: &anyhow::Error, context: AlertContext) -> AlertReport {
        let message = format!("{err:#}");
        let client = Arc::clone(&self.client);
        // The client is called inside the guarded future so a panic while
        // building its future is caught too.
        let call = AssertUnwindSafe(async move { client.capture(message, context).await }).catch_unwind();

        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(Ok(event))) => Ok(event),
            Ok(Ok(Err(e))) => Err(ReportingUnavailable::Backend(format!("{e:#}"))),
            Ok(Err(_panic)) => Err(ReportingUnavailable::Panicked),
            Err(_elapsed) => Err(ReportingUnavailable::Timeout(self.timeout)),
        };

        match outcome {
            Ok(Some(UpstreamEvent { id: Some(id) })) if !id.trim().is_empty() => {
                info!(event_id = %id, "alert reported");
                AlertReport::reported(id)
            }
            Ok(Some(_)) => {
                warn!("reporting backend returned an event without an id");
                AlertReport::fallback()
            }
            Ok(None) => {
                warn!("reporting backend returned no event");
                AlertReport::fallback()
            }
            Err(e) => {
                warn!(error = %e, "alert could not be reported");
                AlertReport::fallback()
            }
        }
    }
}

/// Build the reporter according to `reporting.mode`.
///
/// Returns `Ok(None)` when the adapter is off, or when it is optional and
/// cannot be constructed at all. Errors only in `required` mode.
pub async fn init(cfg: &ReportingConfig) -> anyhow::Result<Option<AlertReporter>> {
    if cfg.mode == ReportingMode::Off {
        info!("error reporting disabled");
        return Ok(None);
    }

    let client = match HttpReportingClient::new(cfg) {
        Ok(client) => client,
        Err(e) if cfg.mode == ReportingMode::Required => {
            return Err(e.context("reporting.mode = \"required\" but the backend is misconfigured"));
        }
        Err(e) => {
            let error = format!("{e:#}");
            warn!(%error, "error reporting misconfigured, continuing without it");
            return Ok(None);
        }
    };

    startup_check(client, cfg).await
}

/// Verify the backend and apply the mode policy. Split from [`init`] so any
/// [`ReportingClient`] can go through the same checks.
pub async fn startup_check(
    client: impl ReportingClient,
    cfg: &ReportingConfig,
) -> anyhow::Result<Option<AlertReporter>> {
    let verified = match tokio::time::timeout(cfg.timeout(), client.verify()).await {
        Ok(result) => result,
        Err(_) => Err(ReportingUnavailable::Timeout(cfg.timeout()).into()),
    };

    match verified {
        Ok(()) => info!(mode = %cfg.mode, "error reporting backend reachable"),
        Err(e) if cfg.mode == ReportingMode::Required => {
            return Err(e.context("reporting.mode = \"required\" but the backend is unreachable"));
        }
        Err(e) => {
            let error = format!("{e:#}");
            warn!(%error, "error reporting backend unreachable, continuing");
        }
    }

    Ok(Some(AlertReporter::new(client, cfg.timeout(), &cfg.source)))
}

/// [`ReportingClient`] that talks JSON over HTTP.
///
/// - `POST <endpoint>/api/events`: submit an event; the response body may be
///   an object with an `id`, an object without one, `null`, or empty.
/// - `GET <endpoint>/api/health`: reachability check.
pub struct HttpReportingClient {
    client: Client,
    endpoint: String,
}

impl HttpReportingClient {
    pub fn new(cfg: &ReportingConfig) -> anyhow::Result<Self> {
        let endpoint = cfg
            .endpoint
            .as_deref()
            .context("reporting.endpoint is not set")?;

        let mut headers = header::HeaderMap::new();
        if let Some(key) = cfg.api_key() {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {key}"))
                    .context("invalid reporting API key value for Authorization header")?,
            );
        } else if let Some(var) = &cfg.api_key_env {
            anyhow::bail!("reporting.api_key_env `{var}` is not set");
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(cfg.timeout())
            .build()
            .context("building reqwest client")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

impl ReportingClient for HttpReportingClient {
    fn capture(
        &self,
        message: String,
        context: AlertContext,
    ) -> BoxFuture<'static, anyhow::Result<Option<UpstreamEvent>>> {
        let client = self.client.clone();
        let url = format!("{}/api/events", self.endpoint);
        async move {
            let body = json!({
                "level": "error",
                "message": message,
                "timestamp": Utc::now(),
                "context": context,
            });
            let response = client
                .post(&url)
                .json(&body)
                .send()
                .await
                .with_context(|| format!("POST {url}"))?;

            let status = response.status();
            let text = response.text().await.context("reading response body")?;
            anyhow::ensure!(status.is_success(), "reporting backend returned HTTP {status}: {text}");

            if text.trim().is_empty() {
                return Ok(None);
            }
            serde_json::from_str::<Option<UpstreamEvent>>(&text)
                .with_context(|| format!("parsing reporting response as JSON: {text}"))
        }
        .boxed()
    }

    fn verify(&self) -> BoxFuture<'static, anyhow::Result<()>> {
        let client = self.client.clone();
        let url = format!("{}/api/health", self.endpoint);
        async move {
            let response = client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("GET {url}"))?;
            anyhow::ensure!(
                response.status().is_success(),
                "reporting health check returned HTTP {}",
                response.status()
            );
            Ok(())
        }
        .boxed()
    }
}
