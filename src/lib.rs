//! Multi-cluster API gateway library.

pub mod cluster;
pub mod config;
pub mod error;
pub mod http;
pub mod kubeconfig;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod security;

pub use cluster::{ClusterContext, ContextStore};
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
