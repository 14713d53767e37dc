//! Cluster connection context.
//!
//! A `ClusterContext` is everything needed to reach one remote API server:
//! where it lives, which roots to trust, and how to authenticate. Contexts
//! are built once and then shared as `Arc<ClusterContext>`; an update is a
//! replacement of the whole entry in the store, never a field mutation.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors raised while building a context.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("cluster name must not be empty")]
    EmptyName,

    #[error("invalid server URL {server:?}: {reason}")]
    InvalidServer { server: String, reason: String },
}

/// Where a context came from.
///
/// File-origin entries remember their source file so that a reconciliation
/// of that file only ever evicts what it previously loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Loaded by the kubeconfig watcher from the given file.
    File(PathBuf),
    /// Added at runtime through the cluster API.
    Dynamic,
}

impl Origin {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Origin::Dynamic)
    }

    /// Label used in client read-back and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::File(_) => "kubeconfig",
            Origin::Dynamic => "dynamic_cluster",
        }
    }
}

/// Credential presented to the remote server.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// `Authorization: Bearer <token>`.
    BearerToken(String),
    /// PEM client certificate and private key, presented during the TLS handshake.
    ClientCertificate { certificate: Vec<u8>, key: Vec<u8> },
    /// `Authorization: Basic ...`.
    Basic { username: String, password: String },
}

// Never print secret material.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::BearerToken(_) => f.write_str("BearerToken(<redacted>)"),
            Credential::ClientCertificate { .. } => f.write_str("ClientCertificate(<redacted>)"),
            Credential::Basic { username, .. } => {
                write!(f, "Basic {{ username: {:?}, password: <redacted> }}", username)
            }
        }
    }
}

/// One reachable backend cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterContext {
    name: String,
    server: Url,
    certificate_authority_data: Option<Vec<u8>>,
    insecure_skip_tls_verify: bool,
    credential: Option<Credential>,
    origin: Origin,
}

impl ClusterContext {
    /// Create a context with no trust material and no credential.
    ///
    /// `server` must be an absolute `http`/`https` URL with a host.
    pub fn new(name: impl Into<String>, server: &str, origin: Origin) -> Result<Self, ContextError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ContextError::EmptyName);
        }

        let server = parse_server(server)?;

        Ok(Self {
            name,
            server,
            certificate_authority_data: None,
            insecure_skip_tls_verify: false,
            credential: None,
            origin,
        })
    }

    pub fn with_certificate_authority(mut self, data: Option<Vec<u8>>) -> Self {
        self.certificate_authority_data = data.filter(|d| !d.is_empty());
        self
    }

    pub fn with_insecure_skip_tls_verify(mut self, insecure: bool) -> Self {
        self.insecure_skip_tls_verify = insecure;
        self
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    pub fn certificate_authority_data(&self) -> Option<&[u8]> {
        self.certificate_authority_data.as_deref()
    }

    pub fn insecure_skip_tls_verify(&self) -> bool {
        self.insecure_skip_tls_verify
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Client-facing view. Credentials and CA bytes are never included.
    pub fn summary(&self) -> ClusterSummary {
        ClusterSummary {
            name: self.name.clone(),
            server: self.server.as_str().trim_end_matches('/').to_string(),
            insecure_skip_tls_verify: self.insecure_skip_tls_verify,
            source: self.origin.as_str().to_string(),
        }
    }
}

fn parse_server(server: &str) -> Result<Url, ContextError> {
    let invalid = |reason: &str| ContextError::InvalidServer {
        server: server.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(server).map_err(|e| invalid(&e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(&format!("unsupported scheme {}", other))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(url)
}

/// Read-back shape returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub name: String,
    pub server: String,
    #[serde(rename = "insecureSkipTLSVerify")]
    pub insecure_skip_tls_verify: bool,
    pub source: String,
}
