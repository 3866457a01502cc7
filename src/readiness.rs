//! Dependency-aware readiness evaluation.
//!
//! [`ReadinessEvaluator`] turns the registered probes into one
//! [`ReadinessVerdict`]:
//!
//! - every probe runs on its own task, bounded by its own timeout, and the
//!   cycle waits for all of them (so a cycle takes as long as the slowest
//!   probe's timeout, not the sum);
//! - timeouts, errors and panics become unhealthy [`ProbeResult`]s rather than
//!   failures of the evaluator;
//! - the verdict is cached for `ttl` and swapped in as a whole, so readers see
//!   either the previous verdict or the new one, never a mix;
//! - at most one refresh is in flight: callers that arrive during a refresh
//!   wait for it and share its verdict.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Serialize, Serializer};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::probe::{CheckStatus, Probe, ProbeError, ProbeRegistry};

/// Outcome of one probe in one cycle. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub probe_name: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(rename = "latency_ms", serialize_with = "as_millis")]
    pub latency: Duration,
    pub evaluated_at: DateTime<Utc>,
}

impl ProbeResult {
    fn from_outcome(
        probe: &Probe,
        outcome: Result<CheckStatus, ProbeError>,
        latency: Duration,
        evaluated_at: DateTime<Utc>,
    ) -> Self {
        let (healthy, detail) = match outcome {
            Ok(status) => (status.healthy, status.detail),
            Err(e) => (false, Some(e.to_string())),
        };
        Self {
            probe_name: probe.name().to_owned(),
            healthy,
            detail,
            latency,
            evaluated_at,
        }
    }
}

/// Aggregated readiness decision for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadinessVerdict {
    /// AND of every result; `true` when no probes are registered.
    pub overall_healthy: bool,
    /// One entry per registered probe, keyed by probe name.
    pub results: BTreeMap<String, ProbeResult>,
    pub generated_at: DateTime<Utc>,
    #[serde(rename = "ttl_ms", serialize_with = "as_millis")]
    pub ttl: Duration,
    #[serde(skip)]
    generated: Instant,
}

impl ReadinessVerdict {
    fn from_results(results: Vec<ProbeResult>, ttl: Duration) -> Self {
        // `all` over an empty iterator is `true`: no dependency, nothing to fail.
        let overall_healthy = results.iter().all(|r| r.healthy);
        Self {
            overall_healthy,
            results: results
                .into_iter()
                .map(|r| (r.probe_name.clone(), r))
                .collect(),
            generated_at: Utc::now(),
            ttl,
            generated: Instant::now(),
        }
    }

    /// Whether this verdict may still be served at `now`.
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        // An unrepresentable expiry is effectively "never expires".
        self.generated
            .checked_add(self.ttl)
            .map_or(true, |expires| expires > now)
    }

    pub fn age(&self) -> Duration {
        self.generated.elapsed()
    }

    pub fn unhealthy(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.values().filter(|r| !r.healthy)
    }
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Runs probes, caches the verdict and serialises refreshes.
pub struct ReadinessEvaluator {
    registry: ProbeRegistry,
    ttl: Duration,
    /// Held only for an `Arc` clone or swap, never across a probe call.
    cached: RwLock<Option<Arc<ReadinessVerdict>>>,
    /// Held for the whole refresh cycle; this is what makes refreshes single-flight.
    refresh: Mutex<()>,
    /// Number of completed cycles. Lets a waiter notice that the refresh it
    /// queued behind has already produced a verdict.
    cycles: AtomicU64,
}

impl ReadinessEvaluator {
    pub fn new(registry: ProbeRegistry, ttl: Duration) -> Self {
        Self {
            registry,
            ttl,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn probe_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of refresh cycles run so far.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// The last verdict, without running any probe.
    pub fn current(&self) -> Option<Arc<ReadinessVerdict>> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop the cached verdict so the next [`evaluate`](Self::evaluate) re-probes.
    ///
    /// Returns whether a verdict was cached.
    pub fn invalidate(&self) -> bool {
        self.cached
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    pub async fn evaluate(&self) -> Arc<ReadinessVerdict> {
        self.evaluate_at(Instant::now()).await
    }

    /// Serve the cached verdict if it is still fresh at `now`, otherwise
    /// refresh. Concurrent callers share a single refresh.
    pub async fn evaluate_at(&self, now: Instant) -> Arc<ReadinessVerdict> {
        let seen = self.cycles.load(Ordering::Acquire);
        if let Some(verdict) = self.fresh_at(now) {
            return verdict;
        }

        let _guard = self.refresh.lock().await;

        if self.cycles.load(Ordering::Acquire) != seen {
            if let Some(verdict) = self.current() {
                debug!("served verdict from concurrent refresh");
                return verdict;
            }
        }
        if let Some(verdict) = self.fresh_at(now) {
            return verdict;
        }

        self.run_cycle().await
    }

    /// Re-probe unconditionally, ignoring the TTL. Still single-flight: waits
    /// for any refresh already running, then starts its own.
    pub async fn force_refresh(&self) -> Arc<ReadinessVerdict> {
        let _guard = self.refresh.lock().await;
        info!("forced readiness refresh");
        self.run_cycle().await
    }

    fn fresh_at(&self, now: Instant) -> Option<Arc<ReadinessVerdict>> {
        self.current().filter(|v| v.is_fresh_at(now))
    }

    /// Caller must hold `self.refresh`.
    async fn run_cycle(&self) -> Arc<ReadinessVerdict> {
        let probes = self.registry.snapshot();
        let started = Instant::now();

        let results = join_all(probes.iter().cloned().map(run_probe)).await;
        for result in results.iter().filter(|r| !r.healthy) {
            warn!(
                probe = %result.probe_name,
                detail = result.detail.as_deref().unwrap_or(""),
                latency_ms = result.latency.as_millis() as u64,
                "probe unhealthy"
            );
        }

        let verdict = Arc::new(ReadinessVerdict::from_results(results, self.ttl));
        let previous = self
            .cached
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&verdict));
        self.cycles.fetch_add(1, Ordering::AcqRel);

        let was_healthy = previous.map(|v| v.overall_healthy);
        if was_healthy != Some(verdict.overall_healthy) {
            info!(
                ready = verdict.overall_healthy,
                probes = verdict.results.len(),
                "readiness changed"
            );
        }
        debug!(
            ready = verdict.overall_healthy,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "readiness cycle complete"
        );

        verdict
    }
}

/// Run one probe on its own task, bounded by its timeout.
///
/// The check is invoked inside the task, so a panic at any point (while
/// building the future or while polling it) surfaces as a `JoinError`
/// here instead of unwinding through the evaluator. The timeout is applied
/// to the join handle, not inside the task: a check that blocks its worker
/// thread cannot hold the cycle past its deadline. Such a task is aborted
/// and left to finish on its own.
async fn run_probe(probe: Probe) -> ProbeResult {
    let cancel = CancellationToken::new();
    // Fires on every exit path, including the caller being dropped mid-cycle.
    let _cancel_on_exit = cancel.clone().drop_guard();

    let evaluated_at = Utc::now();
    let started = Instant::now();
    let timeout = probe.timeout();
    let check = probe.check();
    let task_cancel = cancel.clone();

    let mut task = tokio::spawn(async move { check.check(task_cancel).await });

    let outcome = match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(Ok(status))) => Ok(status),
        Ok(Ok(Err(e))) => Err(ProbeError::Execution(format!("{e:#}"))),
        Ok(Err(e)) if e.is_panic() => Err(ProbeError::Panicked),
        Ok(Err(e)) => Err(ProbeError::Execution(e.to_string())),
        Err(_elapsed) => {
            cancel.cancel();
            task.abort();
            Err(ProbeError::Timeout)
        }
    };

    ProbeResult::from_outcome(&probe, outcome, started.elapsed(), evaluated_at)
}
