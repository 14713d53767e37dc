//! Per-cluster reverse proxy: `/clusters/{cluster}/{*path}`.

use std::time::Instant;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue, Request, Uri};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use url::Url;

use crate::cluster::context::{ClusterContext, Credential};
use crate::error::GatewayError;
use crate::http::request::request_id;
use crate::http::response::outbound_headers;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::proxy::forward;

#[derive(Debug, Deserialize)]
pub struct ClusterPath {
    pub cluster: String,
}

pub async fn cluster_proxy_handler(
    State(state): State<AppState>,
    Path(ClusterPath { cluster }): Path<ClusterPath>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let response = proxy_to_cluster(&state, &cluster, request)
        .await
        .unwrap_or_else(IntoResponse::into_response);
    metrics::record_request("cluster", response.status().as_u16(), start);
    response
}

async fn proxy_to_cluster(
    state: &AppState,
    cluster: &str,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    let context = state
        .store
        .get(cluster)
        .ok_or_else(|| GatewayError::NotFound(cluster.to_string()))?;

    let (parts, body) = request.into_parts();
    let target = target_url(&context, &parts.uri)?;

    tracing::debug!(
        request_id = %request_id(&parts.headers),
        cluster = %cluster,
        method = %parts.method,
        target = %target,
        "Proxying cluster request"
    );

    let mut headers = outbound_headers(parts.headers);
    apply_credential(&mut headers, context.credential())?;

    let client = state.clients.client_for(&context)?;
    forward(&client, parts.method, target, headers, body).await
}

/// `server` joined with everything after `/clusters/{cluster}`, query included.
///
/// Dot segments are rejected and the result must stay under the server's
/// own path, so a sub-path can never climb out of the cluster's base URL.
pub fn target_url(context: &ClusterContext, uri: &Uri) -> Result<Url, GatewayError> {
    let subpath = subpath(uri.path());
    if subpath.split(['/', '\\']).any(is_dot_segment) {
        return Err(GatewayError::Validation(format!("path {:?} contains dot segments", subpath)));
    }

    let base = context.server().as_str().trim_end_matches('/');
    let mut target = format!("{}{}", base, subpath);
    if let Some(query) = uri.query() {
        target.push('?');
        target.push_str(query);
    }
    let target = Url::parse(&target)
        .map_err(|e| GatewayError::Validation(format!("invalid target {:?}: {}", target, e)))?;

    let prefix = context.server().path().trim_end_matches('/');
    let path = target.path();
    let contained = path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'));
    if !contained {
        return Err(GatewayError::Validation(format!(
            "path {:?} escapes the cluster server path {:?}",
            subpath, prefix
        )));
    }
    Ok(target)
}

/// `.` or `..`, percent-encoded or not.
fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// Raw (still percent-encoded) remainder after the cluster segment.
fn subpath(path: &str) -> &str {
    path.strip_prefix("/clusters/")
        .and_then(|rest| rest.find('/').map(|i| &rest[i..]))
        .unwrap_or("")
}

/// Replace any client-supplied authorization with the cluster's own.
///
/// Client certificates are presented during the TLS handshake, so the
/// client's header is left alone for those and for credential-less clusters.
pub fn apply_credential(headers: &mut HeaderMap, credential: Option<&Credential>) -> Result<(), GatewayError> {
    let value = match credential {
        Some(Credential::BearerToken(token)) => format!("Bearer {}", token),
        Some(Credential::Basic { username, password }) => {
            format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
        }
        Some(Credential::ClientCertificate { .. }) | None => return Ok(()),
    };

    let mut value = HeaderValue::from_str(&value)
        .map_err(|_| GatewayError::Upstream("stored credential is not a valid header value".into()))?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(())
}
