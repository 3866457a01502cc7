//! Authorization for operator-only debug actions.
//!
//! The decision rule, in order:
//!
//! 1. `debug.enabled = false` → deny, whatever the caller presents.
//! 2. enabled with a non-empty allowlist → allow only listed identities.
//! 3. enabled with no (or an empty) allowlist → allow.
//!
//! A denial carries no information about the action or the reason; the HTTP
//! layer renders every [`GateDenied`] as the same empty `404`.

use std::collections::{HashMap, HashSet};

use axum::http::{header, HeaderMap};
use serde::Serialize;
use tracing::warn;

use crate::config::DebugConfig;

/// Operator actions reachable through the debug endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugAction {
    ResetDatabase,
    ResetCache,
    SetLogLevel,
    ForceGc,
    RefreshReadiness,
    Diagnostics,
    TestAlert,
}

impl std::fmt::Display for DebugAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ResetDatabase => "reset_database",
            Self::ResetCache => "reset_cache",
            Self::SetLogLevel => "set_log_level",
            Self::ForceGc => "force_gc",
            Self::RefreshReadiness => "refresh_readiness",
            Self::Diagnostics => "diagnostics",
            Self::TestAlert => "test_alert",
        })
    }
}

/// Who is asking. `identity` is `None` for anonymous callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub identity: Option<String>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn identified(identity: impl Into<String>) -> Self {
        Self {
            identity: Some(identity.into()),
        }
    }
}

/// The one and only denial. Deliberately carries nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("not found")]
pub struct GateDenied;

#[derive(Debug, Clone, Default)]
pub struct EndpointGate {
    enabled: bool,
    /// `None` when no allowlist is configured or it is empty.
    allowlist: Option<HashSet<String>>,
    /// Bearer token → operator identity.
    operators: HashMap<String, String>,
}

impl EndpointGate {
    pub fn new(enabled: bool, allowlist: Option<Vec<String>>) -> Self {
        let allowlist = allowlist
            .map(|names| names.into_iter().collect::<HashSet<_>>())
            .filter(|set| !set.is_empty());
        Self {
            enabled,
            allowlist,
            operators: HashMap::new(),
        }
    }

    /// Build from `[debug]`, resolving each operator's token from its env var.
    ///
    /// Operators whose env var is unset are skipped with a warning; they can
    /// never be identified, so an allowlist naming them admits nobody new.
    pub fn from_config(cfg: &DebugConfig) -> Self {
        let mut gate = Self::new(cfg.enabled, cfg.allowlist.clone());
        for op in &cfg.operators {
            match op.token() {
                Some(token) => gate = gate.with_operator(token, &op.name),
                None => warn!(operator = %op.name, env = %op.token_env, "operator token env var unset"),
            }
        }
        if gate.enabled {
            tracing::info!(
                operators = gate.operators.len(),
                allowlist = gate.allowlist.as_ref().map_or(0, HashSet::len),
                "debug endpoints enabled"
            );
        }
        gate
    }

    pub fn with_operator(mut self, token: impl Into<String>, identity: impl Into<String>) -> Self {
        self.operators.insert(token.into(), identity.into());
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Identify the caller from an `Authorization: Bearer <token>` header.
    /// Unknown or missing tokens yield an anonymous caller.
    pub fn caller_from_headers(&self, headers: &HeaderMap) -> CallerContext {
        let identity = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .and_then(|token| self.operators.get(token))
            .cloned();
        CallerContext { identity }
    }

    /// Every action is currently gated by the same rule; `action` is part of
    /// the signature so callers record what was attempted.
    pub fn authorize(&self, _action: DebugAction, caller: &CallerContext) -> Result<(), GateDenied> {
        if !self.enabled {
            return Err(GateDenied);
        }
        match &self.allowlist {
            None => Ok(()),
            Some(allowed) => match &caller.identity {
                Some(identity) if allowed.contains(identity) => Ok(()),
                _ => Err(GateDenied),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const ALL_ACTIONS: [DebugAction; 7] = [
        DebugAction::ResetDatabase,
        DebugAction::ResetCache,
        DebugAction::SetLogLevel,
        DebugAction::ForceGc,
        DebugAction::RefreshReadiness,
        DebugAction::Diagnostics,
        DebugAction::TestAlert,
    ];

    // -----------------------------------------------------------------------
    // authorize
    // -----------------------------------------------------------------------

    #[test]
    fn disabled_gate_denies_everything_even_for_allowlisted_caller() {
        let gate = EndpointGate::new(false, Some(vec!["admin".into()]));
        let admin = CallerContext::identified("admin");
        for action in ALL_ACTIONS {
            assert_eq!(gate.authorize(action, &admin), Err(GateDenied), "{action}");
            assert_eq!(gate.authorize(action, &CallerContext::anonymous()), Err(GateDenied));
        }
    }

    #[test]
    fn default_gate_is_disabled() {
        let gate = EndpointGate::default();
        assert!(!gate.is_enabled());
        assert!(gate.authorize(DebugAction::ForceGc, &CallerContext::identified("x")).is_err());
    }

    #[test]
    fn allowlist_admits_only_listed_identities() {
        let gate = EndpointGate::new(true, Some(vec!["alice".into()]));
        assert!(gate.authorize(DebugAction::ResetCache, &CallerContext::identified("alice")).is_ok());
        assert!(gate.authorize(DebugAction::ResetCache, &CallerContext::identified("bob")).is_err());
        assert!(gate.authorize(DebugAction::ResetCache, &CallerContext::anonymous()).is_err());
    }

    #[test]
    fn enabled_without_allowlist_admits_anyone() {
        let gate = EndpointGate::new(true, None);
        for action in ALL_ACTIONS {
            assert!(gate.authorize(action, &CallerContext::anonymous()).is_ok());
        }
    }

    #[test]
    fn empty_allowlist_behaves_like_no_allowlist() {
        let gate = EndpointGate::new(true, Some(vec![]));
        assert!(gate.authorize(DebugAction::SetLogLevel, &CallerContext::anonymous()).is_ok());
    }

    #[test]
    fn denial_message_is_generic() {
        assert_eq!(GateDenied.to_string(), "not found");
    }

    // -----------------------------------------------------------------------
    // caller_from_headers
    // -----------------------------------------------------------------------

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn known_token_identifies_operator() {
        let gate = EndpointGate::new(true, None).with_operator("tok-123", "alice");
        assert_eq!(
            gate.caller_from_headers(&bearer("tok-123")),
            CallerContext::identified("alice")
        );
    }

    #[test]
    fn unknown_or_missing_token_is_anonymous() {
        let gate = EndpointGate::new(true, None).with_operator("tok-123", "alice");
        assert_eq!(gate.caller_from_headers(&bearer("nope")), CallerContext::anonymous());
        assert_eq!(gate.caller_from_headers(&HeaderMap::new()), CallerContext::anonymous());
    }

    #[test]
    fn from_config_skips_operators_without_token() {
        let cfg = DebugConfig {
            enabled: true,
            allowlist: Some(vec!["ghost".into()]),
            operators: vec![crate::config::OperatorConfig {
                name: "ghost".into(),
                token_env: "READYD_TEST_GATE_TOKEN_UNSET_991".into(),
            }],
        };
        let gate = EndpointGate::from_config(&cfg);
        assert!(gate.operators.is_empty());
        // Allowlist still applies, so an anonymous caller stays out.
        assert!(gate.authorize(DebugAction::Diagnostics, &CallerContext::anonymous()).is_err());
    }
}
