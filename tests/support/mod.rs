//! In-memory doubles for the segment source and report API seams

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use report_segment_downloader::client::{ReportApi, ReportError, ReportResult};
use report_segment_downloader::downloader::{DownloadConfig, RateLimiter};
use report_segment_downloader::fetcher::{FetchError, FetchResult, SegmentFetcher, SegmentSource};
use report_segment_downloader::{ReportParams, ReportStatus, Segment};

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn url(id: &str) -> String {
    format!("https://cdn.example.com/{id}.csv")
}

/// Segment whose payload is `a,b\n{id},1\n`
pub fn csv_payload(id: &str) -> Vec<u8> {
    format!("a,b\n{id},1\n").into_bytes()
}

/// Scripted segment source counting calls and concurrent entries.
#[derive(Default)]
pub struct MockSource {
    payloads: HashMap<String, Bytes>,
    failures: Mutex<HashMap<String, u32>>,
    scripted: Mutex<HashMap<String, VecDeque<Bytes>>>,
    delay: Duration,
    calls: AtomicUsize,
    calls_by_url: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(mut self, url: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        self.payloads.insert(url.into(), payload.into());
        self
    }

    /// First `count` requests for `url` answer HTTP 503
    pub fn with_failures(self, url: impl Into<String>, count: u32) -> Self {
        self.failures.lock().unwrap().insert(url.into(), count);
        self
    }

    /// Answer the next request for `url` with `payload` before the regular one
    pub fn with_payload_once(self, url: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .entry(url.into())
            .or_default()
            .push_back(payload.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls_by_url
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SegmentSource for MockSource {
    async fn fetch(&self, url: &str) -> FetchResult<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_url
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::HttpStatus {
                        status: 503,
                        url: url.to_string(),
                    });
                }
            }
        }

        if let Some(payload) = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
        {
            return Ok(payload);
        }

        self.payloads
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
    }
}

/// Fast retries so failure paths stay quick under paused time
pub fn test_config() -> DownloadConfig {
    DownloadConfig::default().with_backoff_base(Duration::from_millis(10))
}

pub fn fetcher(source: Arc<MockSource>, config: &DownloadConfig) -> Arc<SegmentFetcher> {
    Arc::new(SegmentFetcher::new(
        source,
        Arc::new(RateLimiter::default()),
        config,
    ))
}

/// Scripted report API.
pub struct MockApi {
    pub request_id: String,
    statuses: Mutex<VecDeque<ReportStatus>>,
    instances: Vec<String>,
    segments: HashMap<String, Vec<Segment>>,
    pub created: AtomicUsize,
    pub polls: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl MockApi {
    /// Returns `statuses` in order, repeating the last one forever
    pub fn new(statuses: &[ReportStatus]) -> Self {
        Self {
            request_id: "req-1".to_string(),
            statuses: Mutex::new(statuses.iter().copied().collect()),
            instances: Vec::new(),
            segments: HashMap::new(),
            created: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn with_instance(mut self, instance_id: &str, segments: Vec<Segment>) -> Self {
        self.instances.push(instance_id.to_string());
        self.segments.insert(instance_id.to_string(), segments);
        self
    }
}

#[async_trait]
impl ReportApi for MockApi {
    async fn create_report(&self, _params: &ReportParams) -> ReportResult<String> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.request_id.clone())
    }

    async fn poll_status(&self, request_id: &str) -> ReportResult<ReportStatus> {
        if request_id != self.request_id {
            return Err(ReportError::HttpStatus {
                endpoint: format!("/reports/{request_id}"),
                status: 404,
                body: String::new(),
            });
        }
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().copied()
        };
        Ok(status.unwrap_or(ReportStatus::Processing))
    }

    async fn list_instances(&self, _request_id: &str) -> ReportResult<Vec<String>> {
        Ok(self.instances.clone())
    }

    async fn list_segments(&self, instance_id: &str) -> ReportResult<Vec<Segment>> {
        Ok(self.segments.get(instance_id).cloned().unwrap_or_default())
    }

    async fn delete_request(&self, _request_id: &str) -> ReportResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
