//! Dependency probes.
//!
//! A [`Probe`] pairs a stable name and a timeout with a [`Check`], the
//! capability that actually talks to the dependency. Probes are collected into
//! an immutable [`ProbeRegistry`] at startup and executed by the readiness
//! evaluator on every refresh cycle.
//!
//! Two concrete checks ship with the service:
//!
//! - [`TcpCheck`]: opens a TCP connection (message broker, database)
//! - [`HttpCheck`]: issues a `GET` and expects a 2xx status

use std::{fmt, future::Future, sync::Arc, time::Duration};

use anyhow::Context;
use futures_util::{future::BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

use crate::config::{ProbeConfig, ProbeTarget};

mod http;
mod registry;
mod tcp;

pub use http::HttpCheck;
pub use registry::{ProbeRegistry, RegistryBuilder, RegistryError};
pub use tcp::TcpCheck;

/// Detail recorded for a probe that did not finish within its timeout.
pub const TIMEOUT_DETAIL: &str = "timeout";

/// What a check reports when it completes in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckStatus {
    pub healthy: bool,
    pub detail: Option<String>,
}

impl CheckStatus {
    pub fn healthy() -> Self {
        Self { healthy: true, detail: None }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: Some(detail.into()),
        }
    }
}

/// Per-cycle probe failures. Never fatal; the evaluator turns them into an
/// unhealthy result whose detail is the `Display` text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("timeout")]
    Timeout,
    #[error("{0}")]
    Execution(String),
    #[error("probe panicked")]
    Panicked,
}

/// Capability that confirms one dependency is alive.
///
/// The returned future must be `'static` so it can run on its own task.
/// Implementations clone whatever handles they need (a [`reqwest::Client`] is
/// an `Arc` internally). `cancel` fires once the evaluator gives up on the
/// check; checks that spawn background work should stop it when it does.
pub trait Check: Send + Sync + 'static {
    fn check(&self, cancel: CancellationToken) -> BoxFuture<'static, anyhow::Result<CheckStatus>>;
}

/// Adapts a closure into a [`Check`].
///
/// ```rust,ignore
/// let probe = Probe::new("always-up", Duration::from_secs(1), check_fn(|_| async {
///     Ok(CheckStatus::healthy())
/// }));
/// ```
pub fn check_fn<F, Fut>(f: F) -> impl Check
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<CheckStatus>> + Send + 'static,
{
    FnCheck(f)
}

struct FnCheck<F>(F);

impl<F, Fut> Check for FnCheck<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<CheckStatus>> + Send + 'static,
{
    fn check(&self, cancel: CancellationToken) -> BoxFuture<'static, anyhow::Result<CheckStatus>> {
        (self.0)(cancel).boxed()
    }
}

/// A named, timeout-bounded check of one dependency.
///
/// Cheap to clone: the check itself is shared behind an `Arc`.
#[derive(Clone)]
pub struct Probe {
    name: String,
    timeout: Duration,
    check: Arc<dyn Check>,
}

impl Probe {
    pub fn new(name: impl Into<String>, timeout: Duration, check: impl Check) -> Self {
        Self {
            name: name.into(),
            timeout,
            check: Arc::new(check),
        }
    }

    /// Build a probe from a `[[probes]]` config entry.
    pub fn from_config(cfg: &ProbeConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_millis(cfg.timeout_ms);
        let probe = match &cfg.target {
            ProbeTarget::Tcp { addr } => Self::new(&cfg.name, timeout, TcpCheck::new(addr)),
            ProbeTarget::Http { url } => Self::new(
                &cfg.name,
                timeout,
                HttpCheck::new(url, timeout)
                    .with_context(|| format!("building HTTP check for probe `{}`", cfg.name))?,
            ),
        };
        Ok(probe)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn check(&self) -> Arc<dyn Check> {
        Arc::clone(&self.check)
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
