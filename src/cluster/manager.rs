//! Runtime cluster management.
//!
//! # Responsibilities
//! - Turn the two accepted request shapes into a validated `ClusterRequest`
//! - Build every resulting context before touching the store
//! - Write the whole request in one atomic store update

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::cluster::context::{ClusterContext, ClusterSummary, Credential, Origin};
use crate::cluster::store::ContextStore;
use crate::error::GatewayError;
use crate::kubeconfig::{decode_base64, parse_kubeconfig};

/// Raw `POST /cluster` body.
///
/// Field names follow the client's camelCase; the kubeconfig spellings are
/// accepted as aliases. Binary fields are base64 strings.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    #[serde(alias = "certificate-authority-data", skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,

    #[serde(
        rename = "insecureSkipTLSVerify",
        alias = "insecure-skip-tls-verify",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub insecure_skip_tls_verify: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(alias = "client-certificate-data", skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,

    #[serde(alias = "client-key-data", skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,

    /// Base64-encoded kubeconfig holding any number of contexts.
    #[serde(alias = "kubeconfig", skip_serializing_if = "Option::is_none")]
    pub encoded_config: Option<String>,
}

/// A validated add-cluster request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterRequest {
    Discrete(DiscreteCluster),
    EncodedConfig(String),
}

/// Explicit single-cluster fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscreteCluster {
    pub name: String,
    pub server: String,
    pub certificate_authority_data: Option<Vec<u8>>,
    pub insecure_skip_tls_verify: bool,
    pub credential: Option<Credential>,
}

impl TryFrom<ClusterRequestBody> for ClusterRequest {
    type Error = GatewayError;

    fn try_from(body: ClusterRequestBody) -> Result<Self, Self::Error> {
        // An encoded kubeconfig takes precedence over discrete fields.
        if let Some(encoded) = body.encoded_config {
            return Ok(ClusterRequest::EncodedConfig(encoded));
        }

        let name = body
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| GatewayError::Validation("'name' is required".into()))?;
        let server = body
            .server
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatewayError::Validation("'server' is required".into()))?;

        let decode = |field: &'static str, value: &str| {
            decode_base64(&name, field, value).map_err(|e| GatewayError::Validation(e.to_string()))
        };

        let certificate_authority_data = body
            .certificate_authority_data
            .as_deref()
            .map(|data| decode("certificateAuthorityData", data))
            .transpose()?;

        let credential = match (body.token, body.client_certificate_data, body.client_key_data) {
            (Some(token), _, _) if !token.is_empty() => Some(Credential::BearerToken(token)),
            (_, Some(certificate), Some(key)) => Some(Credential::ClientCertificate {
                certificate: decode("clientCertificateData", &certificate)?,
                key: decode("clientKeyData", &key)?,
            }),
            (_, Some(_), None) | (_, None, Some(_)) => {
                return Err(GatewayError::Validation(
                    "'clientCertificateData' and 'clientKeyData' must be supplied together".into(),
                ));
            }
            _ => None,
        };

        Ok(ClusterRequest::Discrete(DiscreteCluster {
            name,
            server,
            certificate_authority_data,
            insecure_skip_tls_verify: body.insecure_skip_tls_verify,
            credential,
        }))
    }
}

/// Applies add/remove requests to the shared store.
#[derive(Clone)]
pub struct ClusterManager {
    store: ContextStore,
}

impl ClusterManager {
    pub fn new(store: ContextStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// Validate and build every context the request describes.
    pub fn build(&self, request: ClusterRequest) -> Result<Vec<ClusterContext>, GatewayError> {
        match request {
            ClusterRequest::Discrete(cluster) => {
                let context = ClusterContext::new(cluster.name, &cluster.server, Origin::Dynamic)
                    .map_err(|e| GatewayError::Validation(e.to_string()))?
                    .with_certificate_authority(cluster.certificate_authority_data)
                    .with_insecure_skip_tls_verify(cluster.insecure_skip_tls_verify)
                    .with_credential(cluster.credential);
                Ok(vec![context])
            }
            ClusterRequest::EncodedConfig(encoded) => {
                let bytes = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| GatewayError::Validation(format!("kubeconfig is not valid base64: {}", e)))?;
                Ok(parse_kubeconfig(&bytes, &Origin::Dynamic)?)
            }
        }
    }

    /// Add or override the clusters described by `request`.
    ///
    /// Returns the number of contexts written. On error the store is unchanged.
    pub fn add(&self, request: ClusterRequest) -> Result<usize, GatewayError> {
        let contexts = self.build(request)?;
        let names: Vec<String> = contexts.iter().map(|c| c.name().to_string()).collect();

        self.store.put_all(contexts);

        tracing::info!(clusters = ?names, "Dynamic clusters added");
        Ok(names.len())
    }

    /// Remove a dynamically-added cluster.
    pub fn remove(&self, name: &str) -> Result<(), GatewayError> {
        match self.store.remove_dynamic(name) {
            Some(_) => {
                tracing::info!(cluster = %name, "Dynamic cluster removed");
                Ok(())
            }
            None => Err(GatewayError::NotFound(name.to_string())),
        }
    }

    pub fn summaries(&self) -> Vec<ClusterSummary> {
        self.store.list().iter().map(|c| c.summary()).collect()
    }
}
