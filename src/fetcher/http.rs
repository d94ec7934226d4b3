//! reqwest-backed segment source

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::debug;

use super::retry_formatter::{redact_query, FailureKind};
use super::{FetchError, FetchResult, SegmentSource};

/// Per-request timeout for segment downloads.
/// Segments can be tens of megabytes, so this is generous.
pub const DEFAULT_SEGMENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Plain HTTP GET source for pre-signed segment locations.
///
/// Segment URLs are self-authorizing, so no credentials are attached.
#[derive(Debug, Clone)]
pub struct HttpSegmentSource {
    client: Client,
}

impl HttpSegmentSource {
    /// Build a source with the default timeout
    pub fn new() -> FetchResult<Self> {
        Self::with_timeout(DEFAULT_SEGMENT_TIMEOUT)
    }

    /// Build a source with a custom per-request timeout
    pub fn with_timeout(timeout: Duration) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::NetworkError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client (shares its connection pool)
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn map_transport_error(err: reqwest::Error) -> FetchError {
    match FailureKind::from_reqwest(&err) {
        FailureKind::NetworkTimeout => FetchError::Timeout(err.to_string()),
        _ => FetchError::NetworkError(err.to_string()),
    }
}

#[async_trait]
impl SegmentSource for HttpSegmentSource {
    async fn fetch(&self, url: &str) -> FetchResult<Bytes> {
        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        crate::metrics::record_http_request("segment", status.as_u16(), started.elapsed());
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: redact_query(url).to_string(),
            });
        }

        let body = response.bytes().await.map_err(map_transport_error)?;
        debug!(
            url = redact_query(url),
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Segment payload received"
        );
        Ok(body)
    }
}
