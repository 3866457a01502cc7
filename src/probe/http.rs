//! HTTP `GET` check for dependencies that expose a health URL.

use std::time::Duration;

use anyhow::Context;
use futures_util::{future::BoxFuture, FutureExt};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use super::{Check, CheckStatus};

/// Healthy when `GET url` answers with a 2xx status.
///
/// A non-2xx answer is an unhealthy verdict (the dependency responded but is
/// not serving); a network failure is an execution error.
#[derive(Debug, Clone)]
pub struct HttpCheck {
    client: Client,
    url: String,
}

impl HttpCheck {
    /// The client-level timeout matches the probe timeout so a hung request
    /// is torn down by reqwest even if the evaluator has already moved on.
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("readyd/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Check for HttpCheck {
    fn check(&self, cancel: CancellationToken) -> BoxFuture<'static, anyhow::Result<CheckStatus>> {
        let client = self.client.clone();
        let url = self.url.clone();
        async move {
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => anyhow::bail!("GET {url} cancelled"),
                response = client.get(&url).send() => response.with_context(|| format!("GET {url}"))?,
            };

            let status = response.status();
            if status.is_success() {
                Ok(CheckStatus::healthy())
            } else {
                Ok(CheckStatus::unhealthy(format!("HTTP {status}")))
            }
        }
        .boxed()
    }
}
