//! Segment transfer: byte sources, payload decoding and the per-segment fetcher

use async_trait::async_trait;
use bytes::Bytes;

pub mod gzip;
pub mod http;
pub mod retry_formatter;
pub mod segment;

pub use http::HttpSegmentSource;
pub use retry_formatter::{FailureKind, FailureReport, RESUME_HINT};
pub use segment::{sha256_hex, verify_checksum, SegmentFetcher, SegmentOutcome, SkipReason};

/// Segment transfer errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Non-success HTTP status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Location requested (query stripped)
        url: String,
    },

    /// Request timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// Transport failure
    #[error("network error: {0}")]
    NetworkError(String),

    /// Payload hash differs from the advertised checksum
    #[error("checksum validation failed: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Advertised SHA-256 (lowercase hex)
        expected: String,
        /// Computed SHA-256 (lowercase hex)
        actual: String,
    },

    /// Gzip payload could not be inflated
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// Writing the segment file failed
    #[error("IO error: {0}")]
    IoError(String),
}

impl FetchError {
    /// Classify the failure for messaging
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::HttpStatus { status, .. } => FailureKind::from_status(*status),
            Self::Timeout(_) => FailureKind::NetworkTimeout,
            Self::NetworkError(_) => FailureKind::NetworkGeneric,
            Self::ChecksumMismatch { .. } | Self::Decompress(_) => FailureKind::Integrity,
            Self::IoError(_) => FailureKind::LocalIo,
        }
    }

    /// Remediation hint for the user
    pub fn suggestion(&self) -> &'static str {
        self.kind().suggestion()
    }
}

impl From<crate::output::OutputError> for FetchError {
    fn from(err: crate::output::OutputError) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Where segment bytes come from.
///
/// Implementations perform one GET per call; retries, rate limiting and
/// decoding are layered on top by [`SegmentFetcher`].
#[async_trait]
pub trait SegmentSource: Send + Sync {
    /// Fetch the full payload at `url`. Non-2xx responses are errors.
    async fn fetch(&self, url: &str) -> FetchResult<Bytes>;
}
