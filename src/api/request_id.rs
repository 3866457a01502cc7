//! Request ID middleware, installed on both listeners.
//!
//! Every inbound request gets an `X-Request-ID`, taken from the caller when
//! present and sane, otherwise a fresh UUID v4. The ID is stored as an axum
//! [`Extension`](axum::Extension), echoed in the response header and attached
//! to a span, so access-log lines for gated debug actions and test alerts can
//! be tied back to the request that caused them.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument as _;
use uuid::Uuid;

pub const HEADER: &str = "x-request-id";

/// Caller-supplied IDs longer than this are replaced.
const MAX_LEN: usize = 128;

/// Newtype wrapper carrying the assigned request ID.
///
/// ```rust,ignore
/// async fn handler(Extension(req_id): Extension<RequestId>) { ... }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_header(value: &HeaderValue) -> Option<Self> {
        let v = value.to_str().ok()?;
        let usable = !v.is_empty()
            && v.len() <= MAX_LEN
            && v.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        usable.then(|| Self(v.to_owned()))
    }

    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Axum middleware that assigns a [`RequestId`] to every request.
///
/// Apply it **inside** the `tower_http::TraceLayer` so it runs within the
/// trace span.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(HEADER)
        .and_then(RequestId::from_header)
        .unwrap_or_else(RequestId::generate);

    req.extensions_mut().insert(id.clone());

    let span = tracing::debug_span!("request", id = %id.as_str());
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(HEADER, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt; // oneshot

    use super::*;

    fn app() -> Router {
        Router::new()
            .route(
                "/",
                get(|Extension(id): Extension<RequestId>| async move { id.as_str().to_owned() }),
            )
            .layer(middleware::from_fn(request_id_middleware))
    }

    async fn call(header: Option<&str>) -> (String, String) {
        let mut req = Request::get("/");
        if let Some(h) = header {
            req = req.header(HEADER, h);
        }
        let resp = app().oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let echoed = resp.headers()[HEADER].to_str().unwrap().to_owned();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (echoed, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn caller_id_is_kept_and_echoed() {
        let (echoed, seen) = call(Some("deploy-42")).await;
        assert_eq!(echoed, "deploy-42");
        assert_eq!(seen, "deploy-42");
    }

    #[tokio::test]
    async fn missing_id_is_generated() {
        let (echoed, seen) = call(None).await;
        assert_eq!(echoed, seen);
        assert!(Uuid::parse_str(&seen).is_ok());
    }

    #[tokio::test]
    async fn unusable_id_is_replaced() {
        let long = "a".repeat(MAX_LEN + 1);
        for bad in ["", "has space", long.as_str()] {
            let (_, seen) = call(Some(bad)).await;
            assert!(Uuid::parse_str(&seen).is_ok(), "{bad:?} was kept");
        }
    }
}
