//! Template service with dependency-aware readiness.
//!
//! - [`probe`]: dependency checks and the closed probe registry
//! - [`readiness`]: concurrent, cached, single-flight readiness evaluation
//! - [`gate`]: the flag and allowlist in front of operator debug actions
//! - [`alert`]: error reporting that always yields a usable report
//! - [`api`]: public and admin axum routers
//!
//! The `readyd` binary wires these together from a TOML config. A host
//! service can instead build [`state::AppState`] itself, for example to
//! install real [`hooks::OperatorHooks`] for the reset actions.

pub mod alert;
pub mod api;
pub mod config;
pub mod error;
pub mod gate;
pub mod hooks;
pub mod observability;
pub mod probe;
pub mod readiness;
pub mod state;
