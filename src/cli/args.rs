//! Command-line arguments
//!
//! Every tunable can also come from the environment so scheduled jobs can be
//! configured without touching the command line.

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::downloader::config::{
    DownloadConfig, PollConfig, RateLimitConfig, DEFAULT_CONCURRENCY, MAX_CONCURRENCY,
};

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

fn parse_ratio(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if !(value > 0.0 && value <= 1.0) {
        return Err("safety ratio must be in (0, 1]".to_string());
    }
    Ok(value)
}

/// Report Segment Downloader CLI
#[derive(Parser, Debug)]
#[command(name = "report-segment-downloader")]
#[command(about = "Request server-side reports and download their segments", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Report API base URL
    #[arg(long, global = true, env = "REPORT_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token for the report API
    #[arg(long, global = true, env = "REPORT_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Root directory for downloaded reports
    #[arg(long, global = true, env = "REPORT_OUTPUT_DIR", default_value = "reports")]
    pub output_dir: PathBuf,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Segments downloaded concurrently (max 32)
    #[arg(
        long,
        global = true,
        env = "REPORT_CONCURRENCY",
        default_value_t = DEFAULT_CONCURRENCY,
        value_parser = parse_concurrency
    )]
    pub concurrency: usize,

    /// Attempts per call before giving up (range: 1-20)
    #[arg(
        long,
        global = true,
        env = "REPORT_MAX_ATTEMPTS",
        default_value = "3",
        value_parser = clap::value_parser!(u32).range(1..=20)
    )]
    pub max_attempts: u32,

    /// First retry delay in seconds; doubled after every failure
    #[arg(long, global = true, env = "REPORT_BACKOFF_BASE", default_value = "2")]
    pub backoff_base: u64,

    /// Provider's documented hourly request limit
    #[arg(long, global = true, env = "REPORT_HOURLY_LIMIT", default_value = "1000")]
    pub hourly_limit: u32,

    /// Provider's documented per-minute request limit
    #[arg(long, global = true, env = "REPORT_MINUTE_LIMIT", default_value = "100")]
    pub minute_limit: u32,

    /// Fraction of the provider limits this client may use
    #[arg(
        long,
        global = true,
        env = "REPORT_SAFETY_RATIO",
        default_value = "0.97",
        value_parser = parse_ratio
    )]
    pub safety_ratio: f64,

    /// Seconds between report status checks
    #[arg(long, global = true, env = "REPORT_POLL_INTERVAL", default_value = "10")]
    pub poll_interval: u64,

    /// Status checks before giving up
    #[arg(
        long,
        global = true,
        env = "REPORT_POLL_MAX_ATTEMPTS",
        default_value = "360",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub poll_max_attempts: u32,

    /// Re-download segment files that already exist
    #[arg(long, global = true, default_value_t = false)]
    pub overwrite: bool,

    /// Accept payloads whose SHA-256 differs from the advertised checksum
    #[arg(long, global = true, default_value_t = false)]
    pub no_verify_checksums: bool,

    /// Keep segment files separate instead of writing merged.csv
    #[arg(long, global = true, default_value_t = false)]
    pub no_merge: bool,

    /// Hide the progress bar
    #[arg(long, global = true, default_value_t = false)]
    pub no_progress: bool,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true, env = "REPORT_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Segment download knobs
    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig::default()
            .with_concurrency(self.concurrency)
            .with_max_attempts(self.max_attempts)
            .with_backoff_base(Duration::from_secs(self.backoff_base))
            .with_overwrite(self.overwrite)
            .with_verify_checksums(!self.no_verify_checksums)
            .with_merge(!self.no_merge)
    }

    /// Limiter budgets
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::from_provider_limits(self.hourly_limit, self.minute_limit, self.safety_ratio)
    }

    /// Status polling cadence
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll_interval),
            max_attempts: self.poll_max_attempts,
        }
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Request a report, wait for it, and download every segment
    Run(RunArgs),

    /// Continue an existing request (skips creation and finished segments)
    Resume(ResumeArgs),

    /// Show the status of a request
    Status(RequestArgs),

    /// Delete a request on the provider side
    Delete(RequestArgs),

    /// Merge segment files already on disk
    Merge(MergeArgs),
}

/// Arguments for `run`
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Report parameter as key=value (repeatable); values are parsed as JSON when possible
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// JSON object file with report parameters (merged under --param)
    #[arg(long)]
    pub params_file: Option<PathBuf>,

    /// Delete the remote request once every segment is on disk
    #[arg(long, default_value_t = false)]
    pub delete_after: bool,
}

/// Arguments for `resume`
#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Request identifier returned by `run`
    #[arg(long)]
    pub request_id: String,

    /// Delete the remote request once every segment is on disk
    #[arg(long, default_value_t = false)]
    pub delete_after: bool,
}

/// Arguments naming a single request
#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Request identifier
    #[arg(long)]
    pub request_id: String,
}

/// Arguments for `merge`
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Directory holding segment-NNN.csv files
    #[arg(long)]
    pub dir: PathBuf,

    /// Merged output path (default: DIR/merged.csv)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}
