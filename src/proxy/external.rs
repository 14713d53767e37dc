//! Generic outbound proxy: `/externalproxy`.
//!
//! The target URL travels in the `proxy-to` header (`forward-to` is accepted
//! too). A non-empty allow-list restricts which targets may be reached; the
//! check happens before any connection is attempted.

use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::error::GatewayError;
use crate::http::request::request_id;
use crate::http::response::outbound_headers;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::proxy::forward;

pub const PROXY_TO: &str = "proxy-to";
pub const FORWARD_TO: &str = "forward-to";

pub async fn external_proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let response = proxy_external(&state, request)
        .await
        .unwrap_or_else(IntoResponse::into_response);
    metrics::record_request("external", response.status().as_u16(), start);
    response
}

async fn proxy_external(state: &AppState, request: Request<Body>) -> Result<Response, GatewayError> {
    let (parts, body) = request.into_parts();
    let target = target_from_headers(&parts.headers)?;

    if !state.allow_list.permits(&target) {
        metrics::record_external_proxy_rejected();
        tracing::warn!(
            request_id = %request_id(&parts.headers),
            target = %target,
            "External proxy target not allowed"
        );
        return Err(GatewayError::PolicyViolation(format!(
            "target {} is not in the proxy allow-list",
            target
        )));
    }

    tracing::debug!(
        request_id = %request_id(&parts.headers),
        method = %parts.method,
        target = %target,
        "Proxying external request"
    );

    let mut headers = outbound_headers(parts.headers);
    headers.remove(PROXY_TO);
    headers.remove(FORWARD_TO);

    forward(&state.external_client, parts.method, target, headers, body).await
}

/// Parse the target URL from `proxy-to`, falling back to `forward-to`.
pub fn target_from_headers(headers: &HeaderMap) -> Result<Url, GatewayError> {
    let raw = headers
        .get(PROXY_TO)
        .or_else(|| headers.get(FORWARD_TO))
        .ok_or_else(|| GatewayError::Validation("missing 'proxy-to' or 'forward-to' header".into()))?
        .to_str()
        .map_err(|_| GatewayError::Validation("target header is not valid text".into()))?
        .trim();

    let target = Url::parse(raw).map_err(|e| GatewayError::Validation(format!("invalid target URL {:?}: {}", raw, e)))?;
    match target.scheme() {
        "http" | "https" if target.has_host() => Ok(target),
        _ => Err(GatewayError::Validation(format!("unsupported target URL {:?}", raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: &'static str, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_target_header_forms() {
        assert_eq!(
            target_from_headers(&headers("proxy-to", "https://charts.example.com/index.yaml"))
                .unwrap()
                .as_str(),
            "https://charts.example.com/index.yaml"
        );
        assert!(target_from_headers(&headers("forward-to", "http://127.0.0.1:8080/")).is_ok());
    }

    #[test]
    fn test_bad_targets_are_validation_errors() {
        for value in ["not a url", "ftp://files.example.com/", "file:///etc/passwd"] {
            let mut map = HeaderMap::new();
            map.insert(PROXY_TO, HeaderValue::from_str(value).unwrap());
            assert!(matches!(target_from_headers(&map), Err(GatewayError::Validation(_))), "{}", value);
        }
        assert!(matches!(target_from_headers(&HeaderMap::new()), Err(GatewayError::Validation(_))));
    }
}
