//! Request-scoped error taxonomy.
//!
//! Every handler returns `Result<_, GatewayError>`; the conversion to an HTTP
//! response happens here, at the request boundary.

use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::kubeconfig::KubeconfigError;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed or incomplete client input. Nothing was mutated.
    #[error("{0}")]
    Validation(String),

    /// Unknown cluster name.
    #[error("cluster not found: {0}")]
    NotFound(String),

    /// Network, TLS or protocol failure talking to a remote server.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// Undecodable kubeconfig supplied by the client.
    #[error("invalid kubeconfig: {0}")]
    ConfigParse(#[from] KubeconfigError),

    /// External proxy target rejected by the allow-list.
    #[error("{0}")]
    PolicyViolation(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::ConfigParse(_) => StatusCode::BAD_REQUEST,
            GatewayError::PolicyViolation(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest's own message is terse; the cause is in the source chain.
        let mut message = e.to_string();
        let mut source = e.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        GatewayError::Upstream(message)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(GatewayError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(GatewayError::Upstream("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(GatewayError::PolicyViolation("x".into()).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_response_has_json_error_body() {
        let response = GatewayError::NotFound("prod".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }
}
