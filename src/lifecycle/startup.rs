//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the configured kubeconfig files and keep watching them
//! - Bind the listener (plain or TLS) and serve until shutdown

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::cluster::store::ContextStore;
use crate::config::{ClustersConfig, ListenerConfig};
use crate::http::GatewayServer;
use crate::kubeconfig::{KubeconfigWatcher, WatcherHandle};
use crate::lifecycle::Shutdown;
use crate::net::load_tls_config;

/// Load and watch `config.kubeconfig_paths`.
///
/// Returns `None` when no paths are configured or the watcher cannot start;
/// the gateway keeps serving dynamic clusters either way.
pub async fn start_kubeconfig_watcher(
    config: &ClustersConfig,
    store: &ContextStore,
    shutdown: &Shutdown,
) -> Option<WatcherHandle> {
    if config.use_in_cluster {
        tracing::warn!("In-cluster mode is not supported; only kubeconfig and dynamic clusters are served");
    }

    let watcher = KubeconfigWatcher::from_path_list(
        &config.kubeconfig_paths,
        Duration::from_millis(config.watch_debounce_ms),
        Duration::from_secs(config.rescan_interval_secs),
    );
    if watcher.paths().next().is_none() {
        tracing::info!("No kubeconfig paths configured");
        return None;
    }

    match watcher.start(store.clone(), shutdown.subscribe()).await {
        Ok(handle) => {
            tracing::info!(clusters = store.len(), "Kubeconfig watcher started");
            Some(handle)
        }
        Err(e) => {
            tracing::error!(error = %e, "Kubeconfig watcher failed to start; file changes will not be picked up");
            None
        }
    }
}

/// Bind according to `listener` and serve until `shutdown` fires.
pub async fn serve(
    server: GatewayServer,
    listener: &ListenerConfig,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    match &listener.tls {
        Some(tls) => {
            let addr: SocketAddr = listener
                .bind_address
                .parse()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
            let tls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
            server.run_tls(addr, tls, shutdown).await
        }
        None => {
            let tcp = TcpListener::bind(&listener.bind_address).await?;
            server.run(tcp, shutdown).await
        }
    }
}
