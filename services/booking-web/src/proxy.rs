//! HTTP proxy logic
//!
//! Requests that pass the route guard are forwarded: `/api/*` to the booking
//! API, everything else to the page server. Hop-by-hop headers are stripped
//! in both directions and the upstream response is returned verbatim,
//! error statuses included.

use axum::body::Body;
use axum::http::{Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument};

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Request bodies larger than this are refused with `400`.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state passed to the proxy handler via axum State extractor
#[derive(Clone)]
pub struct ProxyState {
    pub client: reqwest::Client,
    /// Booking API base, ending in `/api/v1`
    pub api_url: String,
    pub pages_url: String,
    pub timeout: Duration,
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub in_flight: Arc<AtomicU64>,
}

/// Decrements the in-flight gauge when the request finishes, however it ends.
struct InFlight(Arc<AtomicU64>);

impl InFlight {
    fn enter(counter: &Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// JSON error body: {"error":{"type":"proxy_error","message":"...","request_id":"req_..."}}
pub fn error_response(status: StatusCode, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": "proxy_error",
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Map an inbound URI onto its upstream.
///
/// `/api/v1/x` and `/api/x` both land on `{api_url}/x`; anything else keeps
/// its path on the page server. Query strings are preserved.
pub fn upstream_url(state: &ProxyState, uri: &Uri) -> String {
    let path = uri.path();
    let query = uri.query().map(|q| format!("?{q}")).unwrap_or_default();

    let api_rest = path
        .strip_prefix("/api/v1/")
        .or_else(|| path.strip_prefix("/api/"));
    match api_rest {
        Some(rest) => format!("{}/{rest}{query}", state.api_url.trim_end_matches('/')),
        None => format!("{}{path}{query}", state.pages_url.trim_end_matches('/')),
    }
}

/// Forward an inbound request and relay the upstream response.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn proxy_request(state: &ProxyState, request: Request<Body>, request_id: String) -> Response {
    let _in_flight = InFlight::enter(&state.in_flight);
    state.requests_total.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();
    let method = request.method().clone();

    let response = forward(state, request, &request_id).await;

    let status = response.status();
    if status == StatusCode::BAD_GATEWAY || status == StatusCode::GATEWAY_TIMEOUT {
        state.errors_total.fetch_add(1, Ordering::Relaxed);
    }
    crate::metrics::record_request(
        status.as_u16(),
        method.as_str(),
        started.elapsed().as_secs_f64(),
    );
    response
}

async fn forward(state: &ProxyState, request: Request<Body>, request_id: &str) -> Response {
    let method = request.method().clone();
    let target = upstream_url(state, request.uri());

    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in request.headers() {
        if !is_hop_by_hop(name.as_str()) && name != axum::http::header::HOST {
            headers.append(name.clone(), value.clone());
        }
    }

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "failed to read request body");
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("invalid request body: {e}"),
                request_id,
            );
        }
    };

    debug!(target = %target, "forwarding");
    let upstream = state
        .client
        .request(method, &target)
        .headers(headers)
        .timeout(state.timeout)
        .body(body)
        .send()
        .await;

    let upstream = match upstream {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            error!(error = %e, "upstream timeout");
            crate::metrics::record_upstream_error("timeout");
            return error_response(
                StatusCode::GATEWAY_TIMEOUT,
                &format!("upstream timeout after {}s", state.timeout.as_secs()),
                request_id,
            );
        }
        Err(e) => {
            error!(error = %e, "upstream request failed");
            crate::metrics::record_upstream_error("connect");
            return error_response(
                StatusCode::BAD_GATEWAY,
                &format!("upstream error: {e}"),
                request_id,
            );
        }
    };

    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();
    let bytes = match upstream.bytes().await {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "failed to read upstream response body");
            crate::metrics::record_upstream_error("body");
            return error_response(
                StatusCode::BAD_GATEWAY,
                &format!("upstream response read error: {e}"),
                request_id,
            );
        }
    };

    let mut response = Response::builder().status(status);
    for (name, value) in &upstream_headers {
        if !is_hop_by_hop(name.as_str()) {
            response = response.header(name, value);
        }
    }
    response.body(Body::from(bytes)).unwrap_or_else(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("response build error: {e}"),
            request_id,
        )
    })
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}
