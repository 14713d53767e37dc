//! Cluster management endpoints.
//!
//! - `GET /config`: current clusters and feature flags
//! - `POST /cluster`: add or override clusters (dynamic clusters only)
//! - `DELETE /cluster/{name}`: remove a dynamically-added cluster

use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::cluster::context::ClusterSummary;
use crate::cluster::manager::{ClusterRequest, ClusterRequestBody};
use crate::error::GatewayError;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Body returned by every management endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub clusters: Vec<ClusterSummary>,
    pub is_dynamic_cluster_enabled: bool,
    pub version: String,
}

impl ClientConfig {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            clusters: state.manager.summaries(),
            is_dynamic_cluster_enabled: state.dynamic_clusters_enabled,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub async fn get_config(State(state): State<AppState>) -> Json<ClientConfig> {
    Json(ClientConfig::from_state(&state))
}

pub async fn add_cluster(
    State(state): State<AppState>,
    payload: Result<Json<ClusterRequestBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ClientConfig>), GatewayError> {
    let start = Instant::now();
    let result = add(&state, payload);
    let status = match &result {
        Ok(_) => StatusCode::CREATED.as_u16(),
        Err(e) => e.status().as_u16(),
    };
    metrics::record_request("manage", status, start);

    result.map(|config| (StatusCode::CREATED, Json(config)))
}

fn add(
    state: &AppState,
    payload: Result<Json<ClusterRequestBody>, JsonRejection>,
) -> Result<ClientConfig, GatewayError> {
    let Json(body) = payload.map_err(|e| GatewayError::Validation(e.body_text()))?;
    let request = ClusterRequest::try_from(body)?;
    state.manager.add(request)?;
    state.clients.prune();
    Ok(ClientConfig::from_state(state))
}

pub async fn remove_cluster(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ClientConfig>, GatewayError> {
    let start = Instant::now();
    let result = state.manager.remove(&name);
    let status = match &result {
        Ok(()) => StatusCode::OK.as_u16(),
        Err(e) => e.status().as_u16(),
    };
    metrics::record_request("manage", status, start);

    result?;
    state.clients.prune();
    Ok(Json(ClientConfig::from_state(&state)))
}
