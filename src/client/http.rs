//! reqwest-backed report API client
//!
//! Every call takes a permit from the shared [`RateLimiter`], attaches the
//! bearer token and is retried on transient failures (timeouts, transport
//! errors, 408, 429, 5xx). Other 4xx responses fail immediately.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{ReportApi, ReportError, ReportResult, TokenProvider};
use crate::downloader::config::{DEFAULT_BACKOFF_BASE, DEFAULT_MAX_ATTEMPTS};
use crate::downloader::rate_limit::RateLimiter;
use crate::downloader::retry::RetryPolicy;
use crate::{ReportParams, ReportStatus, Segment};

/// Per-request timeout for API calls
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest error body kept in [`ReportError::HttpStatus`]
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct CreateReportResponse {
    #[serde(alias = "request_id", alias = "requestId")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: ReportStatus,
}

#[derive(Debug, Deserialize)]
struct InstanceRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct InstancesResponse {
    #[serde(default)]
    instances: Vec<InstanceRef>,
}

#[derive(Debug, Deserialize)]
struct SegmentsResponse {
    #[serde(default)]
    segments: Vec<Segment>,
}

/// JSON/REST client for the report service.
///
/// Endpoints, relative to the base URL:
///
/// | operation        | request                          | response                          |
/// |------------------|----------------------------------|-----------------------------------|
/// | create           | `POST reports` (params as body)  | `{"id": "..."}`                   |
/// | poll             | `GET reports/{id}`               | `{"status": "processing"}`        |
/// | list instances   | `GET reports/{id}/instances`     | `{"instances": [{"id": "..."}]}`  |
/// | list segments    | `GET instances/{id}/segments`    | `{"segments": [Segment, ...]}`    |
/// | delete           | `DELETE reports/{id}`            | any                               |
pub struct HttpReportClient {
    client: Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl HttpReportClient {
    /// Create a client for the service at `base_url`
    pub fn new(
        base_url: &str,
        tokens: Arc<dyn TokenProvider>,
        limiter: Arc<RateLimiter>,
    ) -> ReportResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ReportError::ParseError(format!("invalid API URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ReportError::ParseError(format!(
                "API URL '{base_url}' cannot carry a path"
            )));
        }
        let client = Client::builder()
            .timeout(DEFAULT_API_TIMEOUT)
            .build()
            .map_err(|e| ReportError::NetworkError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            tokens,
            limiter,
            retry: RetryPolicy::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF_BASE),
        })
    }

    /// Replace the retry policy applied to every call
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Base URL all endpoints are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint_url(&self, segments: &[&str]) -> ReportResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ReportError::ParseError(format!("API URL '{}' cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(
        &self,
        method: Method,
        endpoint: &'static str,
        segments: &[&str],
        body: Option<&ReportParams>,
    ) -> ReportResult<Bytes> {
        let url = self.endpoint_url(segments)?;
        self.retry
            .run_if(endpoint, ReportError::is_retryable, |_| {
                self.execute_once(method.clone(), endpoint, &url, body)
            })
            .await
    }

    async fn execute_once(
        &self,
        method: Method,
        endpoint: &'static str,
        url: &Url,
        body: Option<&ReportParams>,
    ) -> ReportResult<Bytes> {
        self.limiter.acquire().await;
        let token = self.tokens.token().await?;

        let started = Instant::now();
        let mut request = self
            .client
            .request(method, url.clone())
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        crate::metrics::record_http_request(endpoint, status.as_u16(), started.elapsed());

        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(ReportError::HttpStatus {
                endpoint: url.path().to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        let bytes = response.bytes().await.map_err(map_transport_error)?;
        debug!(
            endpoint,
            status = status.as_u16(),
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Report API call completed"
        );
        Ok(bytes)
    }
}

fn map_transport_error(err: reqwest::Error) -> ReportError {
    if err.is_timeout() {
        ReportError::Timeout(err.to_string())
    } else if err.is_decode() {
        ReportError::ParseError(err.to_string())
    } else {
        ReportError::NetworkError(err.to_string())
    }
}

fn parse<T: DeserializeOwned>(endpoint: &str, bytes: &[u8]) -> ReportResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ReportError::ParseError(format!("{endpoint}: {e}")))
}

#[async_trait]
impl ReportApi for HttpReportClient {
    async fn create_report(&self, params: &ReportParams) -> ReportResult<String> {
        let bytes = self
            .execute(Method::POST, "create_report", &["reports"], Some(params))
            .await?;
        let created: CreateReportResponse = parse("create_report", &bytes)?;
        info!(request_id = %created.id, "Report requested");
        Ok(created.id)
    }

    async fn poll_status(&self, request_id: &str) -> ReportResult<ReportStatus> {
        let bytes = self
            .execute(Method::GET, "poll_status", &["reports", request_id], None)
            .await?;
        let response: StatusResponse = parse("poll_status", &bytes)?;
        Ok(response.status)
    }

    async fn list_instances(&self, request_id: &str) -> ReportResult<Vec<String>> {
        let bytes = self
            .execute(
                Method::GET,
                "list_instances",
                &["reports", request_id, "instances"],
                None,
            )
            .await?;
        let response: InstancesResponse = parse("list_instances", &bytes)?;
        Ok(response.instances.into_iter().map(|i| i.id).collect())
    }

    async fn list_segments(&self, instance_id: &str) -> ReportResult<Vec<Segment>> {
        let bytes = self
            .execute(
                Method::GET,
                "list_segments",
                &["instances", instance_id, "segments"],
                None,
            )
            .await?;
        let response: SegmentsResponse = parse("list_segments", &bytes)?;
        Ok(response.segments)
    }

    async fn delete_request(&self, request_id: &str) -> ReportResult<()> {
        self.execute(Method::DELETE, "delete_request", &["reports", request_id], None)
            .await?;
        info!(request_id, "Report request deleted");
        Ok(())
    }
}
