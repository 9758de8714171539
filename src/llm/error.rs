//! Typed errors for the model-invocation transport
//!
//! Provides structured error types to enable intelligent handling of common
//! failure modes (auth expired, rate limiting, etc.) without string matching.

use thiserror::Error;

/// Transport errors with typed variants
///
/// Enables callers to distinguish between different failure modes:
/// - `Unauthorized` (401) - token expired/invalid; can retry after refresh
/// - `RateLimited` (429) - quota exceeded; can retry after delay
/// - `BadRequest` (400) - malformed request; caller error
/// - `ServiceError` (5xx) - server-side issue; can retry
/// - `Network` - connection/timeout; can retry
/// - `Upstream` - the model backend aborted the turn mid-stream
/// - `Other` - catch-all for unhandled errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Authentication token is expired or invalid (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Malformed request (HTTP 400). Should not retry.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Server-side error (HTTP 5xx). Transient; can retry with backoff.
    #[error("Service error: {0}")]
    ServiceError(String),

    /// Network connectivity issue (connection refused, timeout, etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// The backend reported a failure inside an otherwise healthy stream:
    /// an `[ERROR]` sentinel frame or a payload carrying a `detail` field.
    #[error("{0}")]
    Upstream(String),

    /// Other errors not fitting the above categories
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TransportError {
    /// Check if this error is retryable (after a delay or auth refresh)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Unauthorized(_)
                | TransportError::RateLimited(_)
                | TransportError::ServiceError(_)
                | TransportError::Network(_)
        )
    }

    /// Convert HTTP status code and error text into a typed error
    pub fn from_http_status(status: reqwest::StatusCode, error_text: String) -> Self {
        match status.as_u16() {
            401 => TransportError::Unauthorized(error_text),
            429 => TransportError::RateLimited(error_text),
            400 => TransportError::BadRequest(error_text),
            500..=599 => TransportError::ServiceError(error_text),
            _ => TransportError::Other(anyhow::anyhow!("HTTP {}: {}", status, error_text)),
        }
    }

    /// Convert network/connection errors into a typed error
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            TransportError::Network(format!("Connection failed: {}", e))
        } else if let Some(status) = e.status() {
            Self::from_http_status(status, e.to_string())
        } else {
            TransportError::Other(e.into())
        }
    }
}
