//! Cordon and drain against a mock Kubernetes API.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use reqwest::StatusCode as ClientStatus;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use cluster_gateway::cluster::{ClusterContext, Credential, Origin};
use cluster_gateway::GatewayConfig;

mod common;

#[derive(Clone, Default)]
struct ApiLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl ApiLog {
    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

async fn start_mock_api() -> (SocketAddr, ApiLog) {
    async fn patch_node(State(log): State<ApiLog>, Path(node): Path<String>, Json(body): Json<Value>) -> Json<Value> {
        log.push(format!("patch {} {}", node, body["spec"]["unschedulable"]));
        Json(json!({"metadata": {"name": node}}))
    }

    async fn list_pods(State(log): State<ApiLog>, Query(query): Query<Vec<(String, String)>>) -> Json<Value> {
        log.push(format!("list {}", query[0].1));
        Json(json!({"items": [
            {"metadata": {"name": "web-1", "namespace": "default", "ownerReferences": [{"kind": "ReplicaSet"}]}},
            {"metadata": {"name": "guarded", "namespace": "default"}},
            {"metadata": {"name": "fluentd", "namespace": "kube-system", "ownerReferences": [{"kind": "DaemonSet"}]}}
        ]}))
    }

    async fn evict(
        State(log): State<ApiLog>,
        Path((namespace, pod)): Path<(String, String)>,
    ) -> (StatusCode, Json<Value>) {
        log.push(format!("evict {}/{}", namespace, pod));
        if pod == "guarded" {
            (StatusCode::TOO_MANY_REQUESTS, Json(json!({"message": "disruption budget"})))
        } else {
            (StatusCode::CREATED, Json(json!({})))
        }
    }

    let log = ApiLog::default();
    let app = Router::new()
        .route("/api/v1/nodes/{node}", patch(patch_node))
        .route("/api/v1/pods", get(list_pods))
        .route("/api/v1/namespaces/{namespace}/pods/{pod}/eviction", post(evict))
        .with_state(log.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, log)
}

#[tokio::test]
async fn test_cordon_and_uncordon() {
    let (addr, log) = start_mock_api().await;
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    gateway.store.put(
        ClusterContext::new("prod", &format!("http://{}", addr), Origin::Dynamic)
            .unwrap()
            .with_credential(Some(Credential::BearerToken("secret".into()))),
    );
    let client = common::client();

    let res = client
        .post(gateway.url("/cordon-node"))
        .json(&json!({"cluster": "prod", "nodeName": "worker-1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), ClientStatus::OK);

    let res = client
        .post(gateway.url("/cordon-node"))
        .json(&json!({"cluster": "prod", "nodeName": "worker-1", "unschedulable": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), ClientStatus::OK);

    assert_eq!(log.calls(), ["patch worker-1 true", "patch worker-1 false"]);
}

#[tokio::test]
async fn test_drain_evicts_workload_pods() {
    let (addr, log) = start_mock_api().await;
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    gateway.store.put(common::dynamic_context("prod", &format!("http://{}", addr)));

    let res = common::client()
        .post(gateway.url("/drain-node"))
        .json(&json!({"cluster": "prod", "nodeName": "worker-2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), ClientStatus::OK);

    let report: Value = res.json().await.unwrap();
    assert_eq!(report["evicted"], json!(["default/web-1"]));
    assert_eq!(report["skipped"], json!(["kube-system/fluentd"]));
    assert_eq!(report["failed"][0]["pod"], "default/guarded");

    assert_eq!(
        log.calls(),
        [
            "patch worker-2 true",
            "list spec.nodeName=worker-2",
            "evict default/web-1",
            "evict default/guarded",
        ]
    );
}

#[tokio::test]
async fn test_unknown_cluster_and_remote_errors() {
    let (addr, _log) = start_mock_api().await;
    let gateway = common::start_gateway(GatewayConfig::default()).await;
    let client = common::client();

    let res = client
        .post(gateway.url("/drain-node"))
        .json(&json!({"cluster": "missing", "nodeName": "n"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), ClientStatus::NOT_FOUND);

    // The mock serves no /api/v1/nodes under this prefix: the remote 404
    // comes back as a gateway failure.
    gateway
        .store
        .put(common::dynamic_context("prefixed", &format!("http://{}/elsewhere", addr)));
    let res = client
        .post(gateway.url("/cordon-node"))
        .json(&json!({"cluster": "prefixed", "nodeName": "n"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), ClientStatus::BAD_GATEWAY);
}
