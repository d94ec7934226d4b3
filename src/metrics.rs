//! Operational metrics for report downloads
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed. [`init_metrics`] installs the Prometheus exporter
//! with an HTTP scrape endpoint; the CLI does this when `--metrics-addr`
//! is given.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ReportStatus;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Install the Prometheus exporter listening on `addr`.
///
/// Idempotent: later calls return `Ok` without reinstalling.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        METRICS_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(format!("Failed to install Prometheus exporter: {e}"));
    }

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "HTTP requests to the report API and segment hosts"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_counter!("http_retries_total", Unit::Count, "Retry attempts");
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Backoff slept before a retry"
    );
    describe_histogram!(
        "rate_limit_queue_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for a rate limit permit"
    );
    describe_counter!(
        "segments_total",
        Unit::Count,
        "Segments settled, by outcome"
    );
    describe_counter!(
        "segment_bytes_total",
        Unit::Bytes,
        "Payload bytes received for segments"
    );
    describe_counter!("report_polls_total", Unit::Count, "Status polls, by status");

    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

/// Whether [`init_metrics`] has installed the exporter
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.load(Ordering::SeqCst)
}

/// Record one HTTP exchange against `endpoint` (a low-cardinality label)
pub fn record_http_request(endpoint: &'static str, status: u16, elapsed: Duration) {
    counter!(
        "http_requests_total",
        "endpoint" => endpoint,
        "status" => status.to_string(),
    )
    .increment(1);
    histogram!("http_request_duration_seconds", "endpoint" => endpoint)
        .record(elapsed.as_secs_f64());

    if status == 429 {
        warn!(
            endpoint,
            duration_ms = elapsed.as_millis() as u64,
            "Rate limit error (429) recorded"
        );
    }
}

/// Record a retry about to sleep `delay` after failed attempt `attempt`
pub fn record_retry(operation: &str, attempt: u32, delay: Duration) {
    counter!("http_retries_total", "attempt" => attempt.to_string()).increment(1);
    histogram!("retry_backoff_duration_seconds").record(delay.as_secs_f64());
    debug!(
        operation,
        attempt,
        backoff_ms = delay.as_millis() as u64,
        "Retry backoff recorded"
    );
}

/// Record time spent blocked on the rate limiter
pub fn record_rate_limit_wait(waited: Duration) {
    histogram!("rate_limit_queue_wait_seconds").record(waited.as_secs_f64());
}

/// Segment fetched and written
pub fn record_segment_downloaded(bytes: u64) {
    counter!("segments_total", "outcome" => "downloaded").increment(1);
    counter!("segment_bytes_total").increment(bytes);
}

/// Segment already on disk
pub fn record_segment_resumed() {
    counter!("segments_total", "outcome" => "resumed").increment(1);
}

/// Segment without a source location
pub fn record_segment_skipped() {
    counter!("segments_total", "outcome" => "skipped").increment(1);
}

/// Segment exhausted its retries
pub fn record_segment_failed() {
    counter!("segments_total", "outcome" => "failed").increment(1);
}

/// Record an observed report status
pub fn record_poll(status: ReportStatus) {
    counter!("report_polls_total", "status" => status.as_str()).increment(1);
}
