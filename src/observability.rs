//! Tracing subscriber setup with a live-reloadable filter.
//!
//! The `EnvFilter` sits behind a [`reload`] layer so the `set_log_level`
//! debug action can swap it without restarting the process.

use anyhow::Context;
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LogFormat;

/// Filter used when neither `RUST_LOG` nor `server.log_level` is set.
pub const DEFAULT_FILTER: &str = "readyd=info,tower_http=warn";

/// Handle to the live filter. Cheap to clone.
#[derive(Clone)]
pub struct LogControl {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogControl {
    pub fn new(handle: reload::Handle<EnvFilter, Registry>) -> Self {
        Self { handle }
    }

    /// Replace the active filter, e.g. `"readyd=debug,tower_http=info"`.
    pub fn set_filter(&self, directives: &str) -> anyhow::Result<()> {
        let filter = EnvFilter::try_new(directives)
            .with_context(|| format!("invalid filter directives `{directives}`"))?;
        self.handle
            .reload(filter)
            .context("log subscriber is no longer installed")?;
        Ok(())
    }

    pub fn current(&self) -> Option<String> {
        self.handle.with_current(|f| f.to_string()).ok()
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `fallback`.
pub fn init(fallback: Option<&str>, format: LogFormat) -> LogControl {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback.unwrap_or(DEFAULT_FILTER)));
    let (filter, handle) = reload::Layer::new(filter);

    let json = format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .init();

    LogControl::new(handle)
}
