//! Shared application state injected into every handler via [`axum::extract::State`].

use std::{sync::Arc, time::Instant};

use crate::{
    alert::AlertReporter,
    config::Config,
    gate::EndpointGate,
    hooks::OperatorHooks,
    observability::LogControl,
    readiness::ReadinessEvaluator,
};

pub struct AppState {
    pub readiness: Arc<ReadinessEvaluator>,
    /// Built from `[debug]` at startup.
    pub gate: EndpointGate,
    /// `None` when `reporting.mode = "off"` (or optional and misconfigured);
    /// the test-alert route is then not registered.
    pub reporter: Option<AlertReporter>,
    /// `None` unless the embedding service installs reset actions; the reset
    /// routes then answer `501`.
    pub hooks: Option<Arc<dyn OperatorHooks>>,
    /// `None` when no reloadable subscriber is installed (tests).
    pub log_control: Option<LogControl>,
    /// Process start time, for the uptime gauge.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: &Config,
        readiness: Arc<ReadinessEvaluator>,
        reporter: Option<AlertReporter>,
    ) -> Self {
        Self {
            readiness,
            gate: EndpointGate::from_config(&config.debug),
            reporter,
            hooks: None,
            log_control: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_log_control(mut self, control: LogControl) -> Self {
        self.log_control = Some(control);
        self
    }

    pub fn with_hooks(mut self, hooks: impl OperatorHooks) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    pub fn with_gate(mut self, gate: EndpointGate) -> Self {
        self.gate = gate;
        self
    }
}
