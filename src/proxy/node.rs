//! Node lifecycle operations: `POST /cordon-node` and `POST /drain-node`.
//!
//! Thin consumers of the store: resolve the cluster, then call its
//! Kubernetes API with the cluster's own client and credential.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::cluster::context::ClusterContext;
use crate::error::GatewayError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::proxy::cluster::apply_credential;

const STRATEGIC_MERGE_PATCH: &str = "application/strategic-merge-patch+json";
const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRequest {
    pub cluster: String,
    pub node_name: String,
    #[serde(default = "default_unschedulable")]
    pub unschedulable: bool,
}

fn default_unschedulable() -> bool {
    true
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DrainReport {
    pub node: String,
    pub evicted: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<EvictionFailure>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvictionFailure {
    pub pod: String,
    pub reason: String,
}

pub async fn cordon_node_handler(
    State(state): State<AppState>,
    Json(request): Json<NodeRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let start = Instant::now();
    let result = cordon(&state, &request).await;
    metrics::record_request("node", status_of(&result), start);
    result
}

pub async fn drain_node_handler(
    State(state): State<AppState>,
    Json(request): Json<NodeRequest>,
) -> Result<Json<DrainReport>, GatewayError> {
    let start = Instant::now();
    let result = drain(&state, &request).await;
    metrics::record_request("node", status_of(&result), start);
    result
}

async fn cordon(state: &AppState, request: &NodeRequest) -> Result<Json<serde_json::Value>, GatewayError> {
    let api = NodeApi::resolve(state, request)?;
    api.set_unschedulable(&request.node_name, request.unschedulable).await?;
    tracing::info!(
        cluster = %request.cluster,
        node = %request.node_name,
        unschedulable = request.unschedulable,
        "Node cordon state changed"
    );
    Ok(Json(json!({
        "node": request.node_name,
        "unschedulable": request.unschedulable,
    })))
}

async fn drain(state: &AppState, request: &NodeRequest) -> Result<Json<DrainReport>, GatewayError> {
    let api = NodeApi::resolve(state, request)?;
    let report = api.drain(&request.node_name).await?;
    tracing::info!(
        cluster = %request.cluster,
        node = %request.node_name,
        evicted = report.evicted.len(),
        failed = report.failed.len(),
        "Node drained"
    );
    Ok(Json(report))
}

fn status_of<T>(result: &Result<T, GatewayError>) -> u16 {
    match result {
        Ok(_) => 200,
        Err(e) => e.status().as_u16(),
    }
}

/// Minimal Kubernetes API access for one cluster.
struct NodeApi {
    context: Arc<ClusterContext>,
    client: reqwest::Client,
    headers: HeaderMap,
}

impl NodeApi {
    fn resolve(state: &AppState, request: &NodeRequest) -> Result<Self, GatewayError> {
        if request.cluster.is_empty() || request.node_name.is_empty() {
            return Err(GatewayError::Validation("'cluster' and 'nodeName' are required".into()));
        }
        let context = state
            .store
            .get(&request.cluster)
            .ok_or_else(|| GatewayError::NotFound(request.cluster.clone()))?;
        let client = state.clients.client_for(&context)?;

        let mut headers = HeaderMap::new();
        apply_credential(&mut headers, context.credential())?;

        Ok(Self { context, client, headers })
    }

    /// `server` with the given path segments appended, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.context.server().clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Validation(format!("server {} cannot carry a path", self.context.server())))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn set_unschedulable(&self, node: &str, unschedulable: bool) -> Result<(), GatewayError> {
        let url = self.url(&["api", "v1", "nodes", node])?;
        let body = json!({ "spec": { "unschedulable": unschedulable } });
        let response = self
            .client
            .patch(url.clone())
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static(STRATEGIC_MERGE_PATCH))
            .body(body.to_string())
            .send()
            .await?;
        ensure_success(&url, response).await.map(drop)
    }

    async fn drain(&self, node: &str) -> Result<DrainReport, GatewayError> {
        self.set_unschedulable(node, true).await?;

        let mut url = self.url(&["api", "v1", "pods"])?;
        url.query_pairs_mut()
            .append_pair("fieldSelector", &format!("spec.nodeName={}", node));
        let response = self.client.get(url.clone()).headers(self.headers.clone()).send().await?;
        let pods: PodList = ensure_success(&url, response).await?.json().await?;

        let mut report = DrainReport {
            node: node.to_string(),
            ..Default::default()
        };

        for pod in pods.items {
            let meta = pod.metadata;
            let id = format!("{}/{}", meta.namespace, meta.name);
            if meta.is_daemon_set_pod() || meta.annotations.contains_key(MIRROR_POD_ANNOTATION) {
                report.skipped.push(id);
                continue;
            }
            match self.evict(&meta).await {
                Ok(()) => report.evicted.push(id),
                Err(e) => report.failed.push(EvictionFailure {
                    pod: id,
                    reason: e.to_string(),
                }),
            }
        }

        Ok(report)
    }

    async fn evict(&self, meta: &ObjectMeta) -> Result<(), GatewayError> {
        let url = self.url(&["api", "v1", "namespaces", &meta.namespace, "pods", &meta.name, "eviction"])?;
        let eviction = json!({
            "apiVersion": "policy/v1",
            "kind": "Eviction",
            "metadata": { "name": meta.name, "namespace": meta.namespace },
        });
        let response = self
            .client
            .post(url.clone())
            .headers(self.headers.clone())
            .json(&eviction)
            .send()
            .await?;
        ensure_success(&url, response).await.map(drop)
    }
}

async fn ensure_success(url: &Url, response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(GatewayError::Upstream(format!("{} returned {}: {}", url.path(), status, message.trim())))
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    owner_references: Vec<OwnerReference>,
    #[serde(default)]
    annotations: HashMap<String, String>,
}

impl ObjectMeta {
    fn is_daemon_set_pod(&self) -> bool {
        self.owner_references.iter().any(|o| o.kind == "DaemonSet")
    }
}

#[derive(Debug, Deserialize)]
struct OwnerReference {
    kind: String,
}
