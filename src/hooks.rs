//! Operator reset actions.
//!
//! The service template does not own a database or cache client, so the
//! reset actions are a trait the embedding service implements and installs
//! with [`AppState::with_hooks`](crate::state::AppState::with_hooks). Without
//! one, the reset routes report `501 Not Implemented` rather than pretending
//! to succeed.

use futures_util::future::BoxFuture;

pub trait OperatorHooks: Send + Sync + 'static {
    /// Drop and re-seed the service's database state.
    fn reset_database(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Flush the service's cache or storage bucket.
    fn reset_cache(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}
