//! Startup-time probe registration.
//!
//! [`RegistryBuilder`] is the only way to add probes. Once [`build`] is called
//! the resulting [`ProbeRegistry`] has no mutating methods, so the evaluator's
//! view of the probe set cannot change mid-cycle.
//!
//! [`build`]: RegistryBuilder::build

use std::{collections::HashSet, sync::Arc, time::Duration};

use anyhow::Context;

use super::Probe;
use crate::config::ProbeConfig;

/// Configuration faults detected while registering probes. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("probe `{0}` is already registered")]
    DuplicateProbe(String),
    #[error("probe `{name}` is invalid: {reason}")]
    InvalidProbe { name: String, reason: &'static str },
}

/// Collects probes in registration order, rejecting duplicates and bad timeouts.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    probes: Vec<Probe>,
    names: HashSet<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, probe: Probe) -> Result<&mut Self, RegistryError> {
        if probe.name().trim().is_empty() {
            return Err(RegistryError::InvalidProbe {
                name: probe.name().to_owned(),
                reason: "name must not be empty",
            });
        }
        if probe.timeout() == Duration::ZERO {
            return Err(RegistryError::InvalidProbe {
                name: probe.name().to_owned(),
                reason: "timeout must be greater than zero",
            });
        }
        if !self.names.insert(probe.name().to_owned()) {
            return Err(RegistryError::DuplicateProbe(probe.name().to_owned()));
        }
        self.probes.push(probe);
        Ok(self)
    }

    pub fn build(self) -> ProbeRegistry {
        ProbeRegistry {
            probes: self.probes.into(),
        }
    }
}

/// Immutable, ordered set of registered probes.
#[derive(Debug, Clone)]
pub struct ProbeRegistry {
    probes: Arc<[Probe]>,
}

impl ProbeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn empty() -> Self {
        RegistryBuilder::new().build()
    }

    /// Register every `[[probes]]` entry. The first bad entry aborts startup.
    pub fn from_config(entries: &[ProbeConfig]) -> anyhow::Result<Self> {
        let mut builder = RegistryBuilder::new();
        for entry in entries {
            let probe = Probe::from_config(entry)?;
            builder
                .register(probe)
                .with_context(|| format!("registering probe `{}`", entry.name))?;
        }
        Ok(builder.build())
    }

    /// Registered probes in registration order.
    pub fn snapshot(&self) -> Arc<[Probe]> {
        Arc::clone(&self.probes)
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeTarget;
    use crate::probe::{check_fn, CheckStatus};

    fn probe(name: &str, timeout_ms: u64) -> Probe {
        Probe::new(
            name,
            Duration::from_millis(timeout_ms),
            check_fn(|_| async { Ok(CheckStatus::healthy()) }),
        )
    }

    // -----------------------------------------------------------------------
    // register
    // -----------------------------------------------------------------------

    #[test]
    fn rejects_duplicate_names() {
        let mut builder = RegistryBuilder::new();
        builder.register(probe("db", 100)).unwrap();
        let err = builder.register(probe("db", 200)).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateProbe("db".into()));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = RegistryBuilder::new().register(probe("db", 0)).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidProbe { ref name, .. } if name == "db"));
    }

    #[test]
    fn rejects_blank_name() {
        let err = RegistryBuilder::new().register(probe("  ", 100)).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidProbe { .. }));
    }

    #[test]
    fn failed_registration_leaves_earlier_probes_in_place() {
        let mut builder = RegistryBuilder::new();
        builder.register(probe("db", 100)).unwrap();
        assert!(builder.register(probe("db", 100)).is_err());
        assert_eq!(builder.build().len(), 1);
    }

    // -----------------------------------------------------------------------
    // snapshot
    // -----------------------------------------------------------------------

    #[test]
    fn snapshot_preserves_registration_order() {
        let mut builder = ProbeRegistry::builder();
        builder
            .register(probe("broker", 100))
            .unwrap()
            .register(probe("db", 100))
            .unwrap()
            .register(probe("alerts", 100))
            .unwrap();
        let registry = builder.build();

        let snapshot = registry.snapshot();
        let names: Vec<&str> = snapshot.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["broker", "db", "alerts"]);
    }

    #[test]
    fn empty_registry_has_no_probes() {
        let registry = ProbeRegistry::empty();
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }

    // -----------------------------------------------------------------------
    // from_config
    // -----------------------------------------------------------------------

    #[test]
    fn from_config_surfaces_duplicate_as_error() {
        let entry = ProbeConfig {
            name: "db".into(),
            target: ProbeTarget::Tcp {
                addr: "127.0.0.1:5432".into(),
            },
            timeout_ms: 500,
        };
        let err = ProbeRegistry::from_config(&[entry.clone(), entry]).unwrap_err();
        let root = err.downcast_ref::<RegistryError>();
        assert_eq!(root, Some(&RegistryError::DuplicateProbe("db".into())));
    }
}
