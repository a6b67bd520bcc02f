//! Request dispatch and JSON plumbing.

use std::sync::Arc;
use std::time::Instant;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::handlers;
use super::wire::ErrorResponse;
use super::AppState;

/// Request bodies above this size are rejected outright.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Top-level entry point for every request.
pub async fn route(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let request_id = Uuid::new_v4();
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = dispatch(&state, req).await.unwrap_or_else(error_response);

    debug!(
        %request_id,
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "request handled"
    );

    Ok(response)
}

async fn dispatch(state: &AppState, req: Request<Incoming>) -> Result<Response<Full<Bytes>>> {
    let method = req.method().clone();
    let path = req.uri().path().trim_matches('/').to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let query = req.uri().query().map(String::from);
    let changed_by = changed_by(&req, &state.admin_actor);

    match (&method, segments.as_slice()) {
        (&Method::POST, ["profiles", profile_id, "assign-personas"]) => {
            let profile_id = profile_id.to_string();
            let input = read_json(req).await?;
            json_ok(&handlers::assign_personas(state, &profile_id, input)?)
        }
        (&Method::GET, ["configuration"]) => json_ok(&handlers::get_configuration(state)?),
        (&Method::POST, ["parameters"]) => {
            let body = read_json(req).await?;
            json_ok(&handlers::upsert_parameter(state, body, &changed_by)?)
        }
        (&Method::POST, ["lists"]) => {
            let body = read_json(req).await?;
            json_ok(&handlers::upsert_list(state, body, &changed_by)?)
        }
        (&Method::POST, ["maps"]) => {
            let body = read_json(req).await?;
            json_ok(&handlers::upsert_map(state, body, &changed_by)?)
        }
        (&Method::GET, ["profiles", profile_id]) => {
            json_ok(&handlers::get_profile(state, profile_id)?)
        }
        (&Method::GET, ["audit-logs"]) => {
            json_ok(&handlers::query_audit_logs(state, query.as_deref())?)
        }
        (&Method::DELETE, ["profiles", profile_id, "personas"]) => {
            let profile_id = profile_id.to_string();
            let body = read_json_or_default(req).await?;
            json_ok(&handlers::right_to_object(state, &profile_id, body, &changed_by)?)
        }
        (&Method::GET, ["health"]) => {
            let (healthy, report) = handlers::health(state);
            let status = if healthy {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            json_with_status(status, &report)
        }
        (&Method::GET, ["available-personas"]) => {
            json_ok(&handlers::available_personas(state)?)
        }
        (&Method::POST, ["audience-stats"]) => {
            let body = read_json(req).await?;
            json_ok(&handlers::audience_stats(state, body)?)
        }
        _ => json_with_status(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: format!("no route for {} /{}", method, path),
            },
        ),
    }
}

/// Caller identity from the X-Changed-By header, falling back to the
/// configured administrative actor.
fn changed_by(req: &Request<Incoming>, admin_actor: &str) -> String {
    req.headers()
        .get("x-changed-by")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(admin_actor)
        .to_string()
}

async fn read_body(req: Request<Incoming>) -> Result<Bytes> {
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| Error::MalformedBody(e.to_string()))?
        .to_bytes();
    if body.len() > MAX_BODY_BYTES {
        return Err(Error::MalformedBody("request body too large".into()));
    }
    Ok(body)
}

async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T> {
    let body = read_body(req).await?;
    serde_json::from_slice(&body).map_err(|e| Error::MalformedBody(e.to_string()))
}

/// Like `read_json` but treats an empty body as the type's default.
async fn read_json_or_default<T: DeserializeOwned + Default>(req: Request<Incoming>) -> Result<T> {
    let body = read_body(req).await?;
    if body.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(&body).map_err(|e| Error::MalformedBody(e.to_string()))
}

fn json_ok<T: serde::Serialize>(value: &T) -> Result<Response<Full<Bytes>>> {
    json_with_status(StatusCode::OK, value)
}

fn json_with_status<T: serde::Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<Response<Full<Bytes>>> {
    let body = serde_json::to_vec(value).map_err(|e| Error::Internal(e.to_string()))?;
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .map_err(|e| Error::Internal(e.to_string()))
}

fn error_response(err: Error) -> Response<Full<Bytes>> {
    if !err.is_client_error() {
        warn!("request failed: {}", err.format_for_log());
    }

    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::to_vec(&ErrorResponse {
        error: err.to_string(),
    })
    .unwrap_or_else(|_| b"{\"error\":\"internal error\"}".to_vec());

    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{}"))))
}

/// Parse the audit-log query string into a filter.
pub(super) fn parse_audit_query(query: Option<&str>) -> crate::store::AuditQuery {
    let mut filter = crate::store::AuditQuery::default();
    let Some(query) = query else {
        return filter;
    };

    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("");
        if value.is_empty() {
            continue;
        }
        let value = percent_decode(value);
        match key {
            "profileId" => filter.profile_id = Some(value),
            "action" => filter.action = Some(value),
            "dateStart" => filter.date_start = Some(value),
            "dateEnd" => filter.date_end = Some(value),
            _ => {}
        }
    }
    filter
}

/// Minimal percent decoding for query values ('+' and %XX escapes).
fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                if let (Some(hi), Some(lo)) = (
                    bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                    bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
                ) {
                    out.push((hi * 16 + lo) as u8);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_audit_query_all_filters() {
        let filter = parse_audit_query(Some(
            "profileId=CUST-1&action=ASSIGNED&dateStart=2025-01-01&dateEnd=2025-06-30",
        ));
        assert_eq!(filter.profile_id.as_deref(), Some("CUST-1"));
        assert_eq!(filter.action.as_deref(), Some("ASSIGNED"));
        assert_eq!(filter.date_start.as_deref(), Some("2025-01-01"));
        assert_eq!(filter.date_end.as_deref(), Some("2025-06-30"));
    }

    #[test]
    fn test_parse_audit_query_empty_values_ignored() {
        let filter = parse_audit_query(Some("profileId=&action=ASSIGNED"));
        assert!(filter.profile_id.is_none());
        assert_eq!(filter.action.as_deref(), Some("ASSIGNED"));
    }

    #[test]
    fn test_parse_audit_query_none() {
        let filter = parse_audit_query(None);
        assert!(filter.profile_id.is_none());
        assert!(filter.action.is_none());
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("Customer%20Request"), "Customer Request");
        assert_eq!(percent_decode("a+b"), "a b");
        assert_eq!(percent_decode("plain"), "plain");
        assert_eq!(percent_decode("bad%zz"), "bad%zz");
    }
}
