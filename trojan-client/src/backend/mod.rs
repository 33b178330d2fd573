//! Analysis service transport abstraction and implementations

mod http;
#[cfg(test)]
pub(crate) mod fake;

pub use self::http::HttpBackend;

use crate::request::AnalyzeRequest;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors that can occur when talking to the analysis service
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network-level failure; the message is the transport's own error text
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed response body: {0}")]
    Parse(#[from] serde_json::Error),

    /// Non-2xx reply. `context` is "Request" or "Upload"
    #[error("{context} failed: {status}")]
    Status { context: &'static str, status: u16 },

    /// Both status sources answered with a non-2xx status
    #[error("Status endpoint error {primary} and registry {registry}")]
    AggregatePoll { primary: u16, registry: u16 },

    /// A status source could not be reached or answered with an unreadable body
    #[error("Failed to load model status: {0}")]
    StatusLoad(Box<ClientError>),

    /// Transport failure not carried by a reqwest error: an unusable base URL,
    /// or an error from a non-HTTP `Backend` implementation
    #[error("{0}")]
    Transport(String),
}

impl ClientError {
    /// HTTP status attached to the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            ClientError::StatusLoad(inner) => inner.status(),
            _ => None,
        }
    }
}

/// Raw reply from the service. Status policy is decided by the caller.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Which model status endpoint to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusSource {
    /// `GET {base}/models/status`
    Primary,
    /// `GET {base}/models/registry`, used when the primary answers non-2xx
    Registry,
}

impl StatusSource {
    pub fn path(&self) -> &'static str {
        match self {
            StatusSource::Primary => "models/status",
            StatusSource::Registry => "models/registry",
        }
    }
}

impl std::fmt::Display for StatusSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusSource::Primary => write!(f, "status"),
            StatusSource::Registry => write!(f, "registry"),
        }
    }
}

/// Result of a liveness probe
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub service: Option<String>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Transport to the analysis service
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name for logging/identification
    fn name(&self) -> &str;

    /// Submit text (JSON) or a file (multipart) for analysis
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<HttpReply, ClientError>;

    /// Fetch one of the model status sources
    async fn get_status(&self, source: StatusSource) -> Result<HttpReply, ClientError>;

    /// Check whether the service is up
    async fn health(&self) -> HealthStatus;
}
