//! Outbound HTTP clients.
//!
//! Each cluster gets its own `reqwest::Client` because trust roots and client
//! identity are per-cluster TLS settings. Clients are built on first use and
//! cached until the context they were built from is replaced in the store,
//! whoever replaced it (API handlers or the kubeconfig watcher).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::redirect::Policy;
use reqwest::{Certificate, Client, ClientBuilder, Identity};

use crate::cluster::context::{ClusterContext, Credential};
use crate::cluster::store::ContextStore;
use crate::error::GatewayError;

struct CachedClient {
    /// The exact context the client was built from.
    context: Arc<ClusterContext>,
    client: Client,
}

/// Thread-safe cache of per-cluster clients, keyed by cluster name.
#[derive(Clone)]
pub struct ClientCache {
    inner: Arc<DashMap<String, CachedClient>>,
    store: ContextStore,
    /// Store generation at the last prune.
    pruned_at: Arc<AtomicU64>,
    connect_timeout: Duration,
}

impl ClientCache {
    pub fn new(store: ContextStore, connect_timeout: Duration) -> Self {
        Self {
            pruned_at: Arc::new(AtomicU64::new(store.generation())),
            inner: Arc::new(DashMap::new()),
            store,
            connect_timeout,
        }
    }

    /// Client for `context`, rebuilt if the cached one belongs to an older
    /// version of the same cluster. Any store change since the last call
    /// drops clients of removed or replaced clusters first.
    pub fn client_for(&self, context: &Arc<ClusterContext>) -> Result<Client, GatewayError> {
        let generation = self.store.generation();
        if self.pruned_at.swap(generation, Ordering::AcqRel) != generation {
            self.prune();
        }

        let cached = self
            .inner
            .get(context.name())
            .filter(|entry| Arc::ptr_eq(&entry.context, context))
            .map(|entry| entry.client.clone());
        if let Some(client) = cached {
            return Ok(client);
        }

        let client = cluster_client(context, self.connect_timeout)?;
        tracing::debug!(cluster = %context.name(), "Built outbound client");
        self.inner.insert(
            context.name().to_string(),
            CachedClient {
                context: Arc::clone(context),
                client: client.clone(),
            },
        );
        Ok(client)
    }

    /// Drop clients whose cluster is gone or has been replaced.
    pub fn prune(&self) {
        self.inner.retain(|name, entry| {
            self.store
                .get(name)
                .is_some_and(|current| Arc::ptr_eq(&current, &entry.context))
        });
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Settings shared by every outbound client: no redirects, no system proxy.
pub fn base_builder(connect_timeout: Duration) -> ClientBuilder {
    Client::builder()
        .use_rustls_tls()
        .redirect(Policy::none())
        .no_proxy()
        .connect_timeout(connect_timeout)
}

/// Build a client honoring the cluster's TLS settings and client identity.
pub fn cluster_client(context: &ClusterContext, connect_timeout: Duration) -> Result<Client, GatewayError> {
    let mut builder = base_builder(connect_timeout);

    if context.insecure_skip_tls_verify() {
        builder = builder.danger_accept_invalid_certs(true);
    } else if let Some(ca) = context.certificate_authority_data() {
        // A cluster CA replaces the system roots rather than extending them.
        builder = builder.tls_built_in_root_certs(false);
        for certificate in parse_ca_bundle(context.name(), ca)? {
            builder = builder.add_root_certificate(certificate);
        }
    }

    if let Some(Credential::ClientCertificate { certificate, key }) = context.credential() {
        let mut pem = certificate.clone();
        pem.push(b'\n');
        pem.extend_from_slice(key);
        builder = builder.identity(Identity::from_pem(&pem)?);
    }

    Ok(builder.build()?)
}

fn parse_ca_bundle(cluster: &str, pem: &[u8]) -> Result<Vec<Certificate>, GatewayError> {
    let mut reader = pem;
    let mut certificates = Vec::new();
    for der in rustls_pemfile::certs(&mut reader) {
        let der = der.map_err(|e| {
            GatewayError::Upstream(format!("cluster {}: unreadable certificate authority: {}", cluster, e))
        })?;
        certificates.push(Certificate::from_der(der.as_ref())?);
    }

    if certificates.is_empty() {
        return Err(GatewayError::Upstream(format!(
            "cluster {}: certificate authority data holds no PEM certificates",
            cluster
        )));
    }
    Ok(certificates)
}
