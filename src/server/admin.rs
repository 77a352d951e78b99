use super::AppState;
use crate::config::PolicyEntry;
use crate::engine::{AuditFilter, AuditKind, Tier};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Response};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn json_response(status: u16, body: String) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full_body(body))
        .unwrap()
}

fn bad_request(msg: &str) -> Response<BoxBody> {
    json_response(400, format!(r#"{{"error":"{}"}}"#, msg))
}

pub async fn handle_admin<B>(
    req: Request<B>,
    state: AppState,
) -> Result<Response<BoxBody>, hyper::Error>
where
    B: hyper::body::Body,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());

    match (method, path.as_str()) {
        (Method::GET, "/health" | "/healthz") => Ok(json_response(200, r#"{"status":"ok"}"#.into())),

        (Method::GET, "/ready" | "/readyz") => Ok(json_response(
            200,
            format!(
                r#"{{"status":"ready","store":"{}","policies":{}}}"#,
                state.engine.store_backend(),
                state.engine.policy_count(),
            ),
        )),

        (Method::GET, "/metrics") => {
            let body = state.metrics.render();
            Ok(Response::builder()
                .status(200)
                .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
                .body(full_body(body))
                .unwrap())
        }

        (Method::GET, "/analytics") => {
            let report = state.engine.analytics_report();
            let body = serde_json::to_string_pretty(&report).unwrap_or_default();
            Ok(json_response(200, body))
        }

        (Method::GET, "/audit") => {
            let filter = match parse_audit_filter(query.as_deref()) {
                Ok(f) => f,
                Err(msg) => return Ok(bad_request(msg)),
            };
            let events = state.engine.audit_log(&filter);
            let body = serde_json::to_string_pretty(&events).unwrap_or_default();
            Ok(json_response(200, body))
        }

        (Method::PUT | Method::POST, "/policies") => {
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(_) => return Ok(bad_request("unreadable body")),
            };
            let entry: PolicyEntry = match serde_json::from_slice(&body) {
                Ok(e) => e,
                Err(e) => return Ok(bad_request(&format!("invalid policy: {}", e))),
            };

            let tier = Tier::parse(&entry.tier);
            if tier.as_str() != entry.tier.to_ascii_lowercase() || tier == Tier::Unlimited {
                return Ok(bad_request("tier must be one of free, premium, enterprise"));
            }
            let p = entry.policy;
            if p.window_seconds == 0 || p.max == 0 || p.burst == 0 {
                return Ok(bad_request(
                    "window_seconds, max and burst must all be >= 1",
                ));
            }

            state.engine.set_policy(tier, &entry.endpoint, p);
            Ok(json_response(200, r#"{"status":"ok"}"#.into()))
        }

        (Method::POST, "/cache/clear") => {
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(_) => return Ok(bad_request("unreadable body")),
            };
            #[derive(serde::Deserialize)]
            struct ClearRequest {
                identity: String,
            }
            let clear: ClearRequest = match serde_json::from_slice(&body) {
                Ok(c) => c,
                Err(e) => return Ok(bad_request(&format!("invalid request: {}", e))),
            };
            state.engine.clear_cache_for(&clear.identity);
            Ok(json_response(200, r#"{"status":"ok"}"#.into()))
        }

        _ => Ok(json_response(404, r#"{"error":"not found"}"#.into())),
    }
}

/// Parse `identity` / `type` / `start` query parameters. Values are taken
/// verbatim — identities are opaque tokens, not URL-encoded structures.
fn parse_audit_filter(query: Option<&str>) -> Result<AuditFilter, &'static str> {
    let mut filter = AuditFilter::default();
    let Some(query) = query else {
        return Ok(filter);
    };
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            "identity" => filter.identity = Some(value.to_string()),
            "type" => {
                filter.kind = Some(AuditKind::parse(value).ok_or("unknown audit event type")?)
            }
            "start" => {
                filter.start_time = Some(value.parse().map_err(|_| "start must be an integer")?)
            }
            _ => return Err("unknown query parameter"),
        }
    }
    Ok(filter)
}
