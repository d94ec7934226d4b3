//! CLI error types and conversions

use crate::client::ReportError;
use crate::fetcher::FetchError;
use crate::materializer::MaterializeError;
use crate::output::{MergeError, OutputError};

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Run failed
    #[error("{0}")]
    Materialize(#[from] MaterializeError),

    /// Report API error
    #[error("report API error: {0}")]
    Report(#[from] ReportError),

    /// Merge error
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    /// Output error
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Segment source could not be built
    #[error("fetcher error: {0}")]
    Fetch(#[from] FetchError),

    /// Run finished but some segments are missing
    #[error("{failed} segment(s) failed to download")]
    Incomplete {
        /// Segments that exhausted retries
        failed: usize,
    },

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl CliError {
    /// Remediation hint printed under the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Materialize(e) => Some(e.hint()),
            Self::Report(e) => Some(e.hint()),
            Self::Merge(e) => Some(e.hint()),
            Self::Fetch(e) => Some(e.suggestion()),
            Self::Incomplete { .. } => Some(crate::fetcher::RESUME_HINT),
            Self::ConfigurationError(_) => {
                Some("Set REPORT_API_URL and REPORT_API_TOKEN or pass --api-url/--api-token")
            }
            Self::Output(_) | Self::InvalidArgument(_) => None,
        }
    }
}
