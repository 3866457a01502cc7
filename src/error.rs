//! Unified HTTP error type for axum request handlers.
//!
//! [`AppError`] wraps [`anyhow::Error`] together with the status code to
//! answer with. The blanket [`From`] impl maps any error to `500`, so handlers
//! can return `Result<T, AppError>` and propagate with `?`; use
//! [`AppError::with_status`] when a failure is the caller's fault.
//!
//! Only operator-facing (gated) handlers return `AppError`. The public
//! readiness endpoint renders its own sanitized body and never exposes raw
//! error text.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: impl Into<anyhow::Error>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = format!("{:#}", self.error);
        if self.status.is_server_error() {
            tracing::warn!(status = %self.status, error = %message, "handler error");
        } else {
            tracing::debug!(status = %self.status, error = %message, "request rejected");
        }
        (self.status, Json(json!({ "error": message }))).into_response()
    }
}

/// Convert any `Into<anyhow::Error>` into a `500` [`AppError`].
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    // -----------------------------------------------------------------------
    // IntoResponse
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn conversion_defaults_to_500_with_json_error_body() {
        let err: AppError = anyhow::anyhow!("hook failed").into();
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "hook failed");
    }

    #[tokio::test]
    async fn explicit_status_is_preserved() {
        let err = AppError::with_status(StatusCode::UNPROCESSABLE_ENTITY, anyhow::anyhow!("bad filter"));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["error"], "bad filter");
    }

    #[tokio::test]
    async fn context_chain_is_rendered() {
        use anyhow::Context;
        let err: AppError = Err::<(), _>(anyhow::anyhow!("connection reset"))
            .context("resetting cache")
            .unwrap_err()
            .into();
        let json = body_json(err.into_response()).await;
        assert_eq!(json["error"], "resetting cache: connection reset");
    }

    // -----------------------------------------------------------------------
    // From conversions
    // -----------------------------------------------------------------------

    #[test]
    fn converts_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: AppError = io_err.into();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
