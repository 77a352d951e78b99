use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use std::time::Instant;

use crate::engine::{CheckRequest, Decision, Tier};
use crate::server::AppState;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

/// The platform endpoints fronted by the engine. Anything else is a 404 —
/// only rated endpoints exist on this listener.
const ENDPOINTS: [&str; 3] = ["/api/search", "/api/checkout", "/api/profile"];

/// Handle one API request: normalize the identity headers, ask the engine,
/// and translate the decision into the wire contract (`X-RateLimit-*`
/// headers, `429` with a retry hint on denial).
///
/// The request body is never read; decisions depend on headers alone.
pub async fn handle_request<B>(
    req: Request<B>,
    state: AppState,
) -> Result<Response<BoxBody>, hyper::Error> {
    let start = Instant::now();
    let path = req.uri().path().to_string();

    if !ENDPOINTS.contains(&path.as_str()) {
        let resp = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("content-type", "application/json")
            .body(full_body(r#"{"error":"not found"}"#))
            .unwrap();
        finalize_metrics(&path, resp.status().as_u16(), start);
        return Ok(resp);
    }

    let headers = req.headers();
    let identity = header_or(headers, "x-user-id", "anonymous");
    let tier_raw = header_or(headers, "x-user-tier", "free");
    let region = header_or(headers, "x-region", "US");
    let cost = headers
        .get("x-cost")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|c| *c >= 1)
        .unwrap_or(1);

    let tier = Tier::parse(&tier_raw);
    let decision = state
        .engine
        .check_limit(CheckRequest {
            identity: identity.clone(),
            endpoint: path.clone(),
            tier,
            region,
            cost,
        })
        .await;

    let resp = if decision.allowed {
        decision_response(
            StatusCode::OK,
            &decision,
            endpoint_payload(&path, &identity, tier),
        )
    } else {
        tracing::debug!(
            "api: rate limited, identity={}, endpoint={}, retry_after={}s",
            identity,
            path,
            decision.retry_after_seconds
        );
        decision_response(
            StatusCode::TOO_MANY_REQUESTS,
            &decision,
            serde_json::json!({
                "error": "Rate limit exceeded",
                "retryAfter": decision.retry_after_seconds,
                "remaining": decision.remaining,
            })
            .to_string(),
        )
    };

    finalize_metrics(&path, resp.status().as_u16(), start);
    Ok(resp)
}

fn header_or(headers: &HeaderMap, name: &str, default: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn decision_response(status: StatusCode, decision: &Decision, body: String) -> Response<BoxBody> {
    let mut buf = itoa::Buffer::new();
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .header("X-RateLimit-Remaining", decision.remaining.to_string())
        .header(
            "X-RateLimit-Allowed",
            if decision.allowed { "true" } else { "false" },
        )
        .header(
            "X-RateLimit-RetryAfter",
            buf.format(decision.retry_after_seconds),
        )
        .body(full_body(body))
        .unwrap()
}

/// Demo-grade business payloads; the interesting part of the response is
/// the rate-limit envelope around them.
fn endpoint_payload(endpoint: &str, identity: &str, tier: Tier) -> String {
    match endpoint {
        "/api/search" => serde_json::json!({
            "results": [],
            "total": 0,
        })
        .to_string(),
        "/api/checkout" => serde_json::json!({
            "status": "accepted",
        })
        .to_string(),
        _ => serde_json::json!({
            "identity": identity,
            "tier": tier.as_str(),
        })
        .to_string(),
    }
}

fn finalize_metrics(endpoint: &str, status: u16, start: Instant) {
    let mut buf = itoa::Buffer::new();
    metrics::counter!(
        "limiter_http_requests_total",
        "endpoint" => endpoint.to_string(),
        "status_code" => buf.format(status).to_owned(),
    )
    .increment(1);
    metrics::histogram!(
        "limiter_http_request_duration_seconds",
        "endpoint" => endpoint.to_string(),
    )
    .record(start.elapsed().as_secs_f64());
}
