//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (tracing, timeouts, body limits, request ID)
//! - Serve over plain TCP or TLS until shutdown is signalled

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::routing::{any, delete, get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::cluster::manager::ClusterManager;
use crate::cluster::store::ContextStore;
use crate::config::GatewayConfig;
use crate::http::clusters;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::proxy::client::{base_builder, ClientCache};
use crate::proxy::{cluster, external, node};
use crate::security::AllowList;

/// Grace period for in-flight requests once shutdown starts (TLS listener).
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: ContextStore,
    pub manager: ClusterManager,
    pub clients: ClientCache,
    pub external_client: reqwest::Client,
    pub allow_list: Arc<AllowList>,
    pub dynamic_clusters_enabled: bool,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
}

impl GatewayServer {
    /// Create a server over `store`, which the caller may keep feeding
    /// (e.g. from the kubeconfig watcher).
    pub fn new(config: GatewayConfig, store: ContextStore) -> Result<Self, reqwest::Error> {
        let connect_timeout = Duration::from_secs(config.timeouts.connect_secs);

        let state = AppState {
            manager: ClusterManager::new(store.clone()),
            clients: ClientCache::new(store.clone(), connect_timeout),
            store,
            external_client: base_builder(connect_timeout).build()?,
            allow_list: Arc::new(AllowList::new(config.external_proxy.allowed_urls.iter())),
            dynamic_clusters_enabled: config.clusters.enable_dynamic_clusters,
        };

        if state.allow_list.is_unrestricted() {
            tracing::warn!("External proxy allow-list is empty; any target is reachable");
        }

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/config", get(clusters::get_config))
            .route("/clusters/{cluster}", any(cluster::cluster_proxy_handler))
            .route("/clusters/{cluster}/{*path}", any(cluster::cluster_proxy_handler))
            .route("/externalproxy", any(external::external_proxy_handler))
            .route("/cordon-node", post(node::cordon_node_handler))
            .route("/drain-node", post(node::drain_node_handler));

        // Without dynamic clusters the management routes do not exist (404).
        if config.clusters.enable_dynamic_clusters {
            router = router
                .route("/cluster", post(clusters::add_cluster))
                .route("/cluster/{name}", delete(clusters::remove_cluster));
        }

        let mut router = router
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.security.max_body_size));

        if config.timeouts.request_secs > 0 {
            router = router.layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));
        }

        router
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request.headers()),
                )
            }))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// The router, for driving the gateway without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server over TLS on `addr`.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let signal = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            signal.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use crate::http::request::X_REQUEST_ID;

    fn server(dynamic: bool) -> GatewayServer {
        let mut config = GatewayConfig::default();
        config.clusters.enable_dynamic_clusters = dynamic;
        GatewayServer::new(config, ContextStore::new()).unwrap()
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_config_endpoint_and_request_id() {
        let res = server(false).router().oneshot(request("GET", "/config")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key(X_REQUEST_ID));

        let res = server(false)
            .router()
            .oneshot(
                Request::builder()
                    .uri("/config")
                    .header(X_REQUEST_ID, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.headers()[X_REQUEST_ID], "abc-123");
    }

    #[tokio::test]
    async fn test_management_routes_follow_flag() {
        let res = server(false).router().oneshot(request("DELETE", "/cluster/a")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        // Registered, but nothing to delete.
        let res = server(true).router().oneshot(request("DELETE", "/cluster/a")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("cluster not found"));
    }

    #[tokio::test]
    async fn test_unknown_cluster_needs_no_socket() {
        let res = server(false)
            .router()
            .oneshot(request("GET", "/clusters/missing/api/v1/namespaces"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
