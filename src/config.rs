//! Configuration types for readyd.
//!
//! Config is loaded once at startup from a TOML file and validated before the
//! server opens any ports. It is never re-read: every component receives the
//! values it needs through its constructor. Invalid configs are rejected with
//! a clear error rather than silently falling back to defaults.
//!
//! # Example
//! ```toml
//! [server]
//! port       = 8080
//! admin_port = 8081
//!
//! [readiness]
//! cache_ttl_ms = 2000
//!
//! [debug]
//! enabled   = true
//! allowlist = ["alice"]
//!
//! [[debug.operators]]
//! name      = "alice"
//! token_env = "READYD_TOKEN_ALICE"
//!
//! [reporting]
//! mode     = "optional"
//! endpoint = "https://alerts.internal"
//!
//! [[probes]]
//! name = "postgres"
//! kind = "tcp"
//! addr = "db.internal:5432"
//! timeout_ms = 500
//! ```

use std::{collections::HashSet, path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub readiness: ReadinessConfig,

    /// Operator/debug endpoint gating. Disabled unless explicitly enabled.
    #[serde(default)]
    pub debug: DebugConfig,

    #[serde(default)]
    pub reporting: ReportingConfig,

    /// Dependency probes, registered in file order.
    #[serde(default)]
    pub probes: Vec<ProbeConfig>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("parsing config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port != self.server.admin_port,
            "server.port and server.admin_port must differ (both are {})",
            self.server.port
        );

        // Operator names are caller identities; they must be unique.
        let mut operators = HashSet::new();
        for op in &self.debug.operators {
            anyhow::ensure!(!op.name.trim().is_empty(), "[[debug.operators]] entry has an empty name");
            anyhow::ensure!(
                operators.insert(op.name.as_str()),
                "[[debug.operators]] name `{}` is declared twice",
                op.name
            );
        }

        // An allowlist entry that no operator can ever present is a typo.
        for identity in self.debug.allowlist.iter().flatten() {
            anyhow::ensure!(
                operators.contains(identity.as_str()),
                "debug.allowlist entry `{}` is not a declared operator",
                identity
            );
        }

        if let Some(endpoint) = &self.reporting.endpoint {
            anyhow::ensure!(
                endpoint.starts_with("http://") || endpoint.starts_with("https://"),
                "reporting.endpoint must be an http(s) URL, got `{}`",
                endpoint
            );
        }

        for probe in &self.probes {
            if let ProbeTarget::Http { url } = &probe.target {
                anyhow::ensure!(
                    url.starts_with("http://") || url.starts_with("https://"),
                    "probe `{}` url must be an http(s) URL, got `{}`",
                    probe.name,
                    url
                );
            }
        }

        Ok(())
    }
}

/// Listener and logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port for liveness/readiness (default: 8080).
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Port for metrics and the gated debug endpoints (default: 8081).
    #[serde(default = "defaults::admin_port")]
    pub admin_port: u16,

    /// Initial log filter when `RUST_LOG` is unset, e.g. `"readyd=debug"`.
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: defaults::port(),
            admin_port: defaults::admin_port(),
            log_level: None,
            log_format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReadinessConfig {
    /// How long a readiness verdict is served before probes run again
    /// (default: 2000). `0` re-probes on every request.
    #[serde(default = "defaults::cache_ttl_ms")]
    pub cache_ttl_ms: u64,
}

impl ReadinessConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: defaults::cache_ttl_ms(),
        }
    }
}

/// Gate settings for the operator-only endpoints.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DebugConfig {
    /// Master switch. While `false` every debug route answers `404`,
    /// whatever credentials the caller presents.
    #[serde(default)]
    pub enabled: bool,

    /// Operator names allowed through when enabled. Absent or empty means any
    /// caller is allowed once `enabled = true`.
    #[serde(default)]
    pub allowlist: Option<Vec<String>>,

    /// Bearer tokens that identify operators.
    #[serde(default)]
    pub operators: Vec<OperatorConfig>,
}

/// An operator identity bound to a Bearer token.
///
/// The token itself is read from the environment variable named by
/// `token_env` at startup, which keeps secrets out of the config file.
///
/// ```toml
/// [[debug.operators]]
/// name      = "alice"
/// token_env = "READYD_TOKEN_ALICE"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OperatorConfig {
    pub name: String,
    pub token_env: String,
}

impl OperatorConfig {
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }
}

/// How strongly the service depends on the error-reporting backend.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportingMode {
    /// Adapter disabled; the test-alert endpoint is not registered.
    #[default]
    Off,
    /// Startup problems are logged and the service keeps going.
    Optional,
    /// An unreachable or misconfigured backend aborts startup.
    Required,
}

impl std::fmt::Display for ReportingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::Optional => "optional",
            Self::Required => "required",
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportingConfig {
    #[serde(default)]
    pub mode: ReportingMode,

    /// Base URL of the reporting backend. Events go to `<endpoint>/api/events`.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Environment variable holding the backend API key, if it needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Upper bound on a single report call (default: 5000).
    #[serde(default = "defaults::reporting_timeout_ms")]
    pub timeout_ms: u64,

    /// Value of the `source` field attached to every event (default: `"readyd"`).
    #[serde(default = "defaults::source")]
    pub source: String,
}

impl ReportingConfig {
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            mode: ReportingMode::default(),
            endpoint: None,
            api_key_env: None,
            timeout_ms: defaults::reporting_timeout_ms(),
            source: defaults::source(),
        }
    }
}

/// One dependency probe.
///
/// ```toml
/// [[probes]]
/// name = "rabbitmq"
/// kind = "tcp"
/// addr = "mq.internal:5672"
///
/// [[probes]]
/// name = "search"
/// kind = "http"
/// url  = "http://search.internal/health"
/// timeout_ms = 800
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    /// Stable identifier, shown in readiness output and metrics labels.
    pub name: String,

    #[serde(flatten)]
    pub target: ProbeTarget,

    /// Per-probe timeout in milliseconds (default: 1000). Must be > 0.
    #[serde(default = "defaults::probe_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeTarget {
    Tcp { addr: String },
    Http { url: String },
}

mod defaults {
    pub fn port() -> u16 { 8080 }
    pub fn admin_port() -> u16 { 8081 }
    pub fn cache_ttl_ms() -> u64 { 2_000 }
    pub fn probe_timeout_ms() -> u64 { 1_000 }
    pub fn reporting_timeout_ms() -> u64 { 5_000 }
    pub fn source() -> String { "readyd".into() }
}
