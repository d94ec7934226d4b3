//! Failure classification and user-facing messages for segment transfers.
//!
//! Maps transport failures onto a small set of kinds, each carrying a short
//! description and a remediation hint, and formats the summary printed when
//! a segment exhausts its retries.

use reqwest::Error as ReqwestError;

/// Hint attached to every exhausted-retry summary.
pub const RESUME_HINT: &str =
    "Resume by re-running the same command - completed segments are skipped";

/// Classification of transfer failures for user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Request timed out
    NetworkTimeout,
    /// Connection refused, DNS failure, offline
    NetworkOffline,
    /// HTTP 429
    RateLimit,
    /// HTTP 5xx
    ServerError(u16),
    /// HTTP 401/403 (usually an expired pre-signed location)
    AuthFailed(u16),
    /// HTTP 404/410
    NotFound(u16),
    /// Other 4xx
    ClientError(u16),
    /// Payload failed its checksum or could not be decoded
    Integrity,
    /// Local filesystem failure
    LocalIo,
    /// Anything else
    NetworkGeneric,
}

impl FailureKind {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthFailed(status),
            404 | 410 => Self::NotFound(status),
            429 => Self::RateLimit,
            500..=599 => Self::ServerError(status),
            400..=499 => Self::ClientError(status),
            _ => Self::NetworkGeneric,
        }
    }

    /// Classify a transport-level reqwest error
    pub fn from_reqwest(err: &ReqwestError) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16());
        }
        if err.is_timeout() {
            return Self::NetworkTimeout;
        }
        if err.is_connect() {
            return Self::NetworkOffline;
        }
        Self::NetworkGeneric
    }

    /// Short description used inside log lines
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(503) => "service unavailable",
            Self::ServerError(_) => "server error",
            Self::AuthFailed(_) => "access denied",
            Self::NotFound(_) => "segment not found",
            Self::ClientError(_) => "client error",
            Self::Integrity => "corrupt payload",
            Self::LocalIo => "local write failed",
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your network connection and firewall settings",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::RateLimit => "Lower --hourly-limit / --minute-limit or wait for the window to reset",
            Self::ServerError(_) => "The report service may be degraded, try again later",
            Self::AuthFailed(_) => {
                "Segment links may have expired; re-run to request fresh locations"
            }
            Self::NotFound(_) => "The report instance may have been deleted; re-create the report",
            Self::ClientError(_) => "Check the report parameters",
            Self::Integrity => "The payload was corrupted in transit; re-run to fetch it again",
            Self::LocalIo => "Check free disk space and permissions on the output directory",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }
}

/// Context for the summary logged once a segment exhausts its retries.
#[derive(Debug, Clone)]
pub struct FailureReport {
    /// Segment identifier
    pub segment_id: String,
    /// Attempts made
    pub attempts: u32,
    /// Classified cause
    pub kind: FailureKind,
    /// Last error text
    pub error_message: String,
    /// Source location that failed
    pub url: String,
}

impl FailureReport {
    /// Build a report for `segment_id`
    pub fn new(
        segment_id: impl Into<String>,
        attempts: u32,
        kind: FailureKind,
        error_message: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            segment_id: segment_id.into(),
            attempts,
            kind,
            error_message: error_message.into(),
            url: url.into(),
        }
    }

    /// Multi-line failure summary with suggestions
    pub fn format_failure(&self) -> String {
        let mut lines = vec![
            format!(
                "[FAILED] Segment {} failed after {} attempts ({})",
                self.segment_id,
                self.attempts,
                self.kind.description()
            ),
            format!("  Last error: {}", self.error_message),
            format!("  Source: {}", redact_query(&self.url)),
            "  Suggestions:".to_string(),
        ];
        for suggestion in self.suggestions() {
            lines.push(format!("    - {suggestion}"));
        }
        lines.join("\n")
    }

    /// Kind-specific suggestion followed by the generic resume hint
    pub fn suggestions(&self) -> Vec<String> {
        vec![
            self.kind.suggestion().to_string(),
            format!("Try increasing --max-attempts (current: {})", self.attempts),
            RESUME_HINT.to_string(),
        ]
    }
}

/// Strip the query string; pre-signed locations carry credentials there.
pub fn redact_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
