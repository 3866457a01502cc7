//! TCP connect check for dependencies that speak their own wire protocol
//! (message brokers, databases).

use anyhow::Context;
use futures_util::{future::BoxFuture, FutureExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::{Check, CheckStatus};

/// Healthy when a TCP connection to `addr` can be opened.
#[derive(Debug, Clone)]
pub struct TcpCheck {
    addr: String,
}

impl TcpCheck {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl Check for TcpCheck {
    fn check(&self, cancel: CancellationToken) -> BoxFuture<'static, anyhow::Result<CheckStatus>> {
        let addr = self.addr.clone();
        async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => anyhow::bail!("connect to {addr} cancelled"),
                stream = TcpStream::connect(&addr) => {
                    stream.with_context(|| format!("connecting to {addr}"))?;
                    Ok(CheckStatus::healthy())
                }
            }
        }
        .boxed()
    }
}
