//! Command execution

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::args::{Cli, Commands, MergeArgs, OutputFormat, RunArgs};
use super::progress::BarProgress;
use super::CliError;
use crate::client::{HttpReportClient, ReportApi, StaticToken};
use crate::downloader::RateLimiter;
use crate::fetcher::HttpSegmentSource;
use crate::materializer::{Materializer, RunOutcome};
use crate::output::{collect_segment_files, merge, ReportLayout, RunManifest, MERGED_FILE_NAME};
use crate::shutdown::SharedShutdown;
use crate::ReportParams;

impl Cli {
    /// Execute the selected command
    pub async fn execute(&self, shutdown: SharedShutdown) -> Result<(), CliError> {
        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr).map_err(CliError::ConfigurationError)?;
        }

        match &self.command {
            Commands::Run(args) => {
                let params = parse_params(args)?;
                let outcome = self
                    .materializer(args.delete_after, shutdown)?
                    .run(&params)
                    .await;
                self.finish_run(outcome)
            }
            Commands::Resume(args) => {
                let outcome = self
                    .materializer(args.delete_after, shutdown)?
                    .resume(&args.request_id)
                    .await;
                self.finish_run(outcome)
            }
            Commands::Status(args) => self.status(&args.request_id).await,
            Commands::Delete(args) => {
                self.api(Arc::new(self.limiter()))?
                    .delete_request(&args.request_id)
                    .await?;
                self.print(
                    json!({ "request_id": args.request_id, "deleted": true }),
                    format!("Deleted request {}", args.request_id),
                );
                Ok(())
            }
            Commands::Merge(args) => self.merge_dir(args),
        }
    }

    fn limiter(&self) -> RateLimiter {
        RateLimiter::new(&self.rate_limit_config())
    }

    fn api(&self, limiter: Arc<RateLimiter>) -> Result<HttpReportClient, CliError> {
        let url = self
            .api_url
            .as_deref()
            .ok_or_else(|| CliError::ConfigurationError("no API URL configured".to_string()))?;
        let token = self
            .api_token
            .as_deref()
            .ok_or_else(|| CliError::ConfigurationError("no API token configured".to_string()))?;

        let retry = crate::downloader::RetryPolicy::new(
            self.max_attempts,
            self.download_config().backoff_base,
        );
        Ok(HttpReportClient::new(url, Arc::new(StaticToken::new(token)), limiter)?
            .with_retry_policy(retry))
    }

    fn materializer(
        &self,
        delete_after: bool,
        shutdown: SharedShutdown,
    ) -> Result<Materializer, CliError> {
        // one limiter for API calls and segment transfers
        let limiter = Arc::new(self.limiter());
        let api = Arc::new(self.api(limiter.clone())?);
        let source = Arc::new(HttpSegmentSource::new()?);

        let mut materializer = Materializer::new(api, source, limiter, &self.output_dir)
            .with_download_config(self.download_config())
            .with_poll_config(self.poll_config())
            .with_delete_after(delete_after)
            .with_shutdown(shutdown);

        if !self.no_progress && self.output_format == OutputFormat::Human {
            let bar = Arc::new(BarProgress::new());
            materializer = materializer
                .with_progress_observer(bar.clone())
                .with_state_observer(bar);
        } else {
            materializer =
                materializer.with_progress_observer(Arc::new(crate::downloader::LogProgress));
        }
        Ok(materializer)
    }

    fn finish_run(
        &self,
        outcome: Result<RunOutcome, crate::materializer::MaterializeError>,
    ) -> Result<(), CliError> {
        let outcome = outcome?;
        let failed = outcome.failed_count();

        let instances: Vec<Value> = outcome
            .instances
            .iter()
            .map(|i| {
                json!({
                    "instance_id": i.instance_id,
                    "dir": i.dir,
                    "files": i.report.paths.len(),
                    "resumed": i.report.resumed,
                    "skipped": i.report.skipped,
                    "failed": i.report.failed.iter().map(|f| &f.segment_id).collect::<Vec<_>>(),
                    "merged": i.merged.as_ref().map(|m| &m.output),
                })
            })
            .collect();

        let mut human = format!(
            "Request {}: {} file(s) in {} instance(s)",
            outcome.request_id,
            outcome.files().len(),
            outcome.instances.len()
        );
        for instance in &outcome.instances {
            if let Some(merged) = &instance.merged {
                human.push_str(&format!("\n  merged: {}", merged.output.display()));
            }
        }
        if outcome.deleted {
            human.push_str("\n  remote request deleted");
        }

        self.print(
            json!({
                "request_id": outcome.request_id,
                "instances": instances,
                "manifest": outcome.manifest_path,
                "failed": failed,
                "deleted": outcome.deleted,
            }),
            human,
        );

        if failed > 0 {
            return Err(CliError::Incomplete { failed });
        }
        Ok(())
    }

    async fn status(&self, request_id: &str) -> Result<(), CliError> {
        let status = self
            .api(Arc::new(self.limiter()))?
            .poll_status(request_id)
            .await?;

        let manifest_path = ReportLayout::new(&self.output_dir).manifest_path(request_id);
        let manifest = if manifest_path.exists() {
            match RunManifest::load(&manifest_path) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!(path = %manifest_path.display(), error = %e, "Ignoring unreadable manifest");
                    None
                }
            }
        } else {
            None
        };

        let mut human = format!("Request {request_id}: {status}");
        if let Some(manifest) = &manifest {
            human.push_str(&format!(
                "\n  local: {} file(s), {} failed",
                manifest.written_count(),
                manifest.failed_count()
            ));
        }
        self.print(
            json!({
                "request_id": request_id,
                "status": status,
                "local_files": manifest.as_ref().map(RunManifest::written_count),
                "local_failed": manifest.as_ref().map(RunManifest::failed_count),
            }),
            human,
        );
        Ok(())
    }

    fn merge_dir(&self, args: &MergeArgs) -> Result<(), CliError> {
        let files = collect_segment_files(&args.dir)?;
        let output = args
            .output
            .clone()
            .unwrap_or_else(|| args.dir.join(MERGED_FILE_NAME));
        let summary = merge(&files, &output)?;
        info!(
            output = %summary.output.display(),
            files = summary.files_merged,
            "Merge finished"
        );
        self.print(
            json!({
                "output": summary.output,
                "files_merged": summary.files_merged,
                "files_missing": summary.files_missing,
                "data_lines": summary.data_lines,
            }),
            format!(
                "Merged {} file(s), {} data line(s) -> {}",
                summary.files_merged,
                summary.data_lines,
                summary.output.display()
            ),
        );
        Ok(())
    }

    fn print(&self, json: Value, human: String) {
        match self.output_format {
            OutputFormat::Json => println!("{json}"),
            OutputFormat::Human => println!("{human}"),
        }
    }
}

/// Collect report parameters from `--params-file` and `--param key=value`.
///
/// Values that parse as JSON keep their type (`limit=10` is a number),
/// anything else is a string. Later keys override earlier ones.
pub fn parse_params(args: &RunArgs) -> Result<ReportParams, CliError> {
    let mut params = match &args.params_file {
        Some(path) => {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                CliError::InvalidArgument(format!("cannot read {}: {e}", path.display()))
            })?;
            match serde_json::from_str::<Value>(&contents) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(CliError::InvalidArgument(format!(
                        "{} must contain a JSON object",
                        path.display()
                    )))
                }
                Err(e) => {
                    return Err(CliError::InvalidArgument(format!(
                        "{} is not valid JSON: {e}",
                        path.display()
                    )))
                }
            }
        }
        None => ReportParams::new(),
    };

    for pair in &args.params {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| CliError::InvalidArgument(format!("expected KEY=VALUE, got '{pair}'")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::InvalidArgument(format!(
                "empty parameter name in '{pair}'"
            )));
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        params.insert(key.to_string(), value);
    }
    Ok(params)
}
