//! Request forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! /clusters/{cluster}/{*path} → cluster.rs (store lookup, credential)  ┐
//! /externalproxy              → external.rs (allow-list check)         ├→ forward()
//! /drain-node, /cordon-node   → node.rs (Kubernetes API calls)         ┘   → client.rs
//! ```
//!
//! # Design Decisions
//! - Request and response bodies are streamed, never buffered
//! - No retries: a failed attempt is reported as 502
//! - Dropping the handler future (client disconnect) drops the upstream
//!   request with it

pub mod client;
pub mod cluster;
pub mod external;
pub mod node;

use axum::body::{Body, HttpBody};
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use url::Url;

use crate::error::GatewayError;
use crate::http::response::from_upstream;

pub use client::ClientCache;

/// Send one request upstream and stream the answer back.
pub(crate) async fn forward(
    client: &reqwest::Client,
    method: Method,
    target: Url,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, GatewayError> {
    let mut request = client.request(method, target).headers(headers);
    if let Some(body) = outbound_body(body) {
        request = request.body(body);
    }

    let upstream = request.send().await?;
    Ok(from_upstream(upstream))
}

/// Bodyless requests stay bodyless upstream instead of turning into an empty
/// chunked stream.
fn outbound_body(body: Body) -> Option<reqwest::Body> {
    if body.is_end_stream() || body.size_hint().exact() == Some(0) {
        None
    } else {
        Some(reqwest::Body::wrap_stream(body.into_data_stream()))
    }
}
