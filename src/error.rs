use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::{SourceFailures, SourceId};

/// Unified error type for the Dramahub application
#[derive(Error, Debug)]
pub enum HubError {
    // Input errors
    #[error("Invalid request: {0}")]
    Validation(String),

    // Proxy registry / pool errors
    #[error("Proxy registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("No proxies available")]
    ProxyUnavailable,

    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    // Fetch errors
    #[error("Proxy attempt through {proxy} failed: {reason}")]
    ProxyAttemptFailed { proxy: String, reason: String },

    #[error("Direct attempt failed: {0}")]
    DirectAttemptFailed(String),

    #[error("Upstream returned HTTP {status}")]
    UpstreamStatus { status: u16 },

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Operation timed out")]
    Timeout,

    // Source errors
    #[error("Unexpected payload from {source_id}: {reason}")]
    SourceNormalization { source_id: SourceId, reason: String },

    #[error("{message}")]
    NotFound {
        message: String,
        source_failed: SourceFailures,
    },

    #[error("All sources failed")]
    SourcesExhausted { source_failed: SourceFailures },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Dramahub operations
pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            HubError::Validation(_)
            | HubError::InvalidProxyAddress(_)
            | HubError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 404 Not Found
            HubError::NotFound { .. } => StatusCode::NOT_FOUND,

            // 502 Bad Gateway
            HubError::ProxyAttemptFailed { .. }
            | HubError::DirectAttemptFailed(_)
            | HubError::UpstreamStatus { .. }
            | HubError::Upstream(_)
            | HubError::SourceNormalization { .. } => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            HubError::ProxyUnavailable | HubError::RegistryUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 504 Gateway Timeout
            HubError::Timeout => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            HubError::SourcesExhausted { .. }
            | HubError::Io(_)
            | HubError::Json(_)
            | HubError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Per-source failure flags attached to lookup errors
    pub fn source_failed(&self) -> Option<&SourceFailures> {
        match self {
            HubError::NotFound { source_failed, .. }
            | HubError::SourcesExhausted { source_failed } => Some(source_failed),
            _ => None,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

// Implement IntoResponse for API error responses
impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self.source_failed() {
            Some(failed) => json!({
                "error": self.to_string(),
                "sourceFailed": failed,
            }),
            None => json!({
                "error": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

// Transport errors keep only the message; timeouts get their own variant
impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HubError::Timeout
        } else if let Some(status) = err.status() {
            HubError::UpstreamStatus {
                status: status.as_u16(),
            }
        } else {
            HubError::Upstream(err.to_string())
        }
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for HubError {
    fn from(err: url::ParseError) -> Self {
        HubError::InvalidConfig(format!("invalid URL: {}", err))
    }
}
