//! Kubeconfig document model and conversion into cluster contexts.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

use crate::cluster::context::{ClusterContext, ContextError, Credential, Origin};

/// Errors produced while turning kubeconfig bytes into contexts.
#[derive(Debug, Error)]
pub enum KubeconfigError {
    #[error("invalid kubeconfig YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("context {context:?} references unknown cluster {cluster:?}")]
    UnknownCluster { context: String, cluster: String },

    #[error("context {context:?} references unknown user {user:?}")]
    UnknownUser { context: String, user: String },

    #[error("{owner:?}: invalid base64 in {field}: {source}")]
    Base64 {
        owner: String,
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("failed to read {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{owner:?}: {field} names a file; an encoded kubeconfig must carry its data inline")]
    FileReference { owner: String, field: &'static str },

    #[error("context {context:?}: {source}")]
    Context {
        context: String,
        #[source]
        source: ContextError,
    },
}

#[derive(Debug, Default, Deserialize)]
struct KubeConfigDocument {
    clusters: Option<Vec<NamedCluster>>,
    contexts: Option<Vec<NamedContext>>,
    users: Option<Vec<NamedUser>>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry {
    server: String,
    certificate_authority_data: Option<String>,
    certificate_authority: Option<PathBuf>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextEntry,
}

#[derive(Debug, Deserialize)]
struct ContextEntry {
    cluster: String,
    #[serde(default)]
    user: String,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: UserEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UserEntry {
    token: Option<String>,
    #[serde(rename = "tokenFile")]
    token_file: Option<PathBuf>,
    client_certificate_data: Option<String>,
    client_key_data: Option<String>,
    client_certificate: Option<PathBuf>,
    client_key: Option<PathBuf>,
    username: Option<String>,
    password: Option<String>,
}

/// Parse a kubeconfig document into one context per kubeconfig `context`.
///
/// Relative file references resolve against the directory of the source file
/// when `origin` is a file. A dynamic document may not reference files at
/// all. The whole document fails if any context is unusable; an empty
/// document yields no contexts.
pub fn parse_kubeconfig(data: &[u8], origin: &Origin) -> Result<Vec<ClusterContext>, KubeconfigError> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let document: Option<KubeConfigDocument> = serde_yaml::from_slice(data)?;
    let document = document.unwrap_or_default();

    let base_dir = match origin {
        Origin::File(path) => Some(path.parent().map(Path::to_path_buf).unwrap_or_default()),
        Origin::Dynamic => None,
    };

    let clusters: HashMap<&str, &ClusterEntry> = document
        .clusters
        .iter()
        .flatten()
        .map(|c| (c.name.as_str(), &c.cluster))
        .collect();
    let users: HashMap<&str, &UserEntry> = document
        .users
        .iter()
        .flatten()
        .map(|u| (u.name.as_str(), &u.user))
        .collect();

    let mut contexts = Vec::new();
    for named in document.contexts.iter().flatten() {
        let cluster = clusters
            .get(named.context.cluster.as_str())
            .ok_or_else(|| KubeconfigError::UnknownCluster {
                context: named.name.clone(),
                cluster: named.context.cluster.clone(),
            })?;

        let user = if named.context.user.is_empty() {
            None
        } else {
            let user = users
                .get(named.context.user.as_str())
                .ok_or_else(|| KubeconfigError::UnknownUser {
                    context: named.name.clone(),
                    user: named.context.user.clone(),
                })?;
            Some(*user)
        };

        let ca_data = certificate_authority(&named.context.cluster, cluster, base_dir.as_deref())?;
        let credential = match user {
            Some(user) => credential(&named.context.user, user, base_dir.as_deref())?,
            None => None,
        };

        let context = ClusterContext::new(named.name.clone(), &cluster.server, origin.clone())
            .map_err(|source| KubeconfigError::Context {
                context: named.name.clone(),
                source,
            })?
            .with_certificate_authority(ca_data)
            .with_insecure_skip_tls_verify(cluster.insecure_skip_tls_verify)
            .with_credential(credential);

        contexts.push(context);
    }

    Ok(contexts)
}

/// Split a list of kubeconfig paths with the platform separator
/// (`:` on Unix, `;` on Windows). Empty segments are dropped.
pub fn split_paths(paths: &str) -> Vec<PathBuf> {
    std::env::split_paths(OsStr::new(paths))
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}

/// Decode a standard base64 field.
pub fn decode_base64(owner: &str, field: &'static str, value: &str) -> Result<Vec<u8>, KubeconfigError> {
    STANDARD
        .decode(value.trim())
        .map_err(|source| KubeconfigError::Base64 {
            owner: owner.to_string(),
            field,
            source,
        })
}

fn certificate_authority(
    name: &str,
    cluster: &ClusterEntry,
    base_dir: Option<&Path>,
) -> Result<Option<Vec<u8>>, KubeconfigError> {
    if let Some(data) = &cluster.certificate_authority_data {
        return decode_base64(name, "certificate-authority-data", data).map(Some);
    }
    cluster
        .certificate_authority
        .as_deref()
        .map(|path| read_referenced(name, "certificate-authority", path, base_dir))
        .transpose()
}

fn credential(
    name: &str,
    user: &UserEntry,
    base_dir: Option<&Path>,
) -> Result<Option<Credential>, KubeconfigError> {
    if let Some(token) = user.token.as_deref().filter(|t| !t.is_empty()) {
        return Ok(Some(Credential::BearerToken(token.to_string())));
    }
    if let Some(path) = &user.token_file {
        let token = read_referenced(name, "tokenFile", path, base_dir)?;
        let token = String::from_utf8_lossy(&token).trim().to_string();
        return Ok(Some(Credential::BearerToken(token)));
    }

    let certificate = match (&user.client_certificate_data, &user.client_certificate) {
        (Some(data), _) => Some(decode_base64(name, "client-certificate-data", data)?),
        (None, Some(path)) => Some(read_referenced(name, "client-certificate", path, base_dir)?),
        (None, None) => None,
    };
    let key = match (&user.client_key_data, &user.client_key) {
        (Some(data), _) => Some(decode_base64(name, "client-key-data", data)?),
        (None, Some(path)) => Some(read_referenced(name, "client-key", path, base_dir)?),
        (None, None) => None,
    };
    if let (Some(certificate), Some(key)) = (certificate, key) {
        return Ok(Some(Credential::ClientCertificate { certificate, key }));
    }

    if let (Some(username), Some(password)) = (&user.username, &user.password) {
        return Ok(Some(Credential::Basic {
            username: username.clone(),
            password: password.clone(),
        }));
    }

    // exec / auth-provider plugins are not supported.
    Ok(None)
}

/// Read a file named by a kubeconfig field. `base_dir` is `None` for
/// documents that did not come from disk, which may not name files.
fn read_referenced(
    owner: &str,
    field: &'static str,
    path: &Path,
    base_dir: Option<&Path>,
) -> Result<Vec<u8>, KubeconfigError> {
    let Some(dir) = base_dir else {
        return Err(KubeconfigError::FileReference {
            owner: owner.to_string(),
            field,
        });
    };
    let resolved = dir.join(path);
    fs::read(&resolved).map_err(|source| KubeconfigError::ReadFile {
        path: resolved,
        source,
    })
}
