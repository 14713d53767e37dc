//! Multi-cluster API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                 CLUSTER GATEWAY                  │
//!                         │                                                  │
//!  kubeconfig files ──────┼─▶ kubeconfig::watcher ──reconcile──┐             │
//!                         │                                    ▼             │
//!  POST/DELETE /cluster ──┼─▶ cluster::manager ───put/remove─▶ cluster::store│
//!                         │                                    │             │
//!  /clusters/{c}/... ─────┼─▶ proxy::cluster ◀───────get───────┘             │──▶ API servers
//!  /externalproxy ────────┼─▶ proxy::external (allow-list) ──────────────────┼──▶ external URLs
//!                         │                                                  │
//!                         │  config · observability · lifecycle · security   │
//!                         └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use cluster_gateway::config::loader::load_config;
use cluster_gateway::config::validation::validate_config;
use cluster_gateway::config::GatewayConfig;
use cluster_gateway::lifecycle::{signals, startup, Shutdown};
use cluster_gateway::observability::{logging, metrics};
use cluster_gateway::{ContextStore, GatewayServer};

#[derive(Parser, Debug)]
#[command(name = "cluster-gateway", version, about = "Multi-cluster Kubernetes API gateway")]
struct Args {
    /// Gateway configuration file (TOML).
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Kubeconfig files to load and watch, `:`-separated.
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<String>,

    /// Allow clusters to be added and removed at runtime.
    #[arg(long)]
    enable_dynamic_clusters: bool,

    /// Comma-separated external proxy allow-list.
    #[arg(long, value_delimiter = ',')]
    proxy_urls: Vec<String>,

    /// Listen address, e.g. 127.0.0.1:4466.
    #[arg(long)]
    bind: Option<String>,
}

impl Args {
    fn apply(self, config: &mut GatewayConfig) {
        if let Some(paths) = self.kubeconfig {
            config.clusters.kubeconfig_paths = paths;
        }
        if self.enable_dynamic_clusters {
            config.clusters.enable_dynamic_clusters = true;
        }
        if !self.proxy_urls.is_empty() {
            config.external_proxy.allowed_urls = self.proxy_urls;
        }
        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    args.apply(&mut config);
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("invalid configuration: {}", error);
        }
        return Err("invalid configuration".into());
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cluster-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        dynamic_clusters = config.clusters.enable_dynamic_clusters,
        allowed_urls = config.external_proxy.allowed_urls.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let store = ContextStore::new();
    let watcher = startup::start_kubeconfig_watcher(&config.clusters, &store, &shutdown).await;

    let server = GatewayServer::new(config.clone(), store)?;

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::shutdown_signal().await;
        trigger.trigger();
    });

    let result = startup::serve(server, &config.listener, shutdown.subscribe()).await;

    shutdown.trigger();
    if let Some(watcher) = watcher {
        watcher.join().await;
    }

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
