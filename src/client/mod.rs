//! Report lifecycle API: create, poll, list instances and segments, delete
//!
//! The remote service is opaque to the rest of the crate; everything goes
//! through the [`ReportApi`] trait. [`HttpReportClient`] is the JSON/REST
//! implementation, gated by the shared rate limiter.

use async_trait::async_trait;

use crate::{ReportParams, ReportStatus, Segment};

pub mod auth;
pub mod http;

pub use auth::{StaticToken, TokenProvider};
pub use http::HttpReportClient;

/// Report API errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReportError {
    /// Non-success HTTP status
    #[error("{endpoint} returned HTTP {status}: {body}")]
    HttpStatus {
        /// Endpoint path
        endpoint: String,
        /// Status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Request timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// Transport failure
    #[error("network error: {0}")]
    NetworkError(String),

    /// Response body did not match the expected shape
    #[error("parse error: {0}")]
    ParseError(String),

    /// No usable credential
    #[error("authentication error: {0}")]
    AuthError(String),
}

impl ReportError {
    /// Whether the failure is expected to be transient
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            Self::Timeout(_) | Self::NetworkError(_) => true,
            Self::ParseError(_) | Self::AuthError(_) => false,
        }
    }

    /// Remediation hint for the user
    pub fn hint(&self) -> &'static str {
        match self {
            Self::HttpStatus { status: 401 | 403, .. } | Self::AuthError(_) => {
                "Check REPORT_API_TOKEN and that it has access to the report API"
            }
            Self::HttpStatus { status: 404, .. } => {
                "Check the request id; the report may have been deleted"
            }
            Self::HttpStatus { status: 429, .. } => {
                "Lower --hourly-limit / --minute-limit; other clients may share this credential"
            }
            Self::HttpStatus { status, .. } if *status >= 500 => {
                "The report service is having trouble; try again later"
            }
            Self::HttpStatus { .. } => "Check the report parameters",
            Self::Timeout(_) | Self::NetworkError(_) => {
                "Check network connectivity and REPORT_API_URL"
            }
            Self::ParseError(_) => "The service returned an unexpected response; check REPORT_API_URL",
        }
    }
}

/// Result type for report API operations
pub type ReportResult<T> = Result<T, ReportError>;

/// Remote report lifecycle operations.
///
/// Implementations must route every call through the shared rate limiter.
#[async_trait]
pub trait ReportApi: Send + Sync {
    /// Request generation of a report; returns its request id
    async fn create_report(&self, params: &ReportParams) -> ReportResult<String>;

    /// Current generation state
    async fn poll_status(&self, request_id: &str) -> ReportResult<ReportStatus>;

    /// Materialized instances of a request
    async fn list_instances(&self, request_id: &str) -> ReportResult<Vec<String>>;

    /// Downloadable segments of an instance, in discovery order
    async fn list_segments(&self, instance_id: &str) -> ReportResult<Vec<Segment>>;

    /// Remove the request on the remote side
    async fn delete_request(&self, request_id: &str) -> ReportResult<()>;
}
