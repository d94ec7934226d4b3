//! CLI argument parsing and config derivation

use clap::Parser;
use std::time::Duration;

use report_segment_downloader::cli::{Cli, Commands, OutputFormat};

#[test]
fn test_run_with_params_and_defaults() {
    let cli = Cli::try_parse_from([
        "report-segment-downloader",
        "run",
        "--param",
        "metric=views",
        "--param",
        "days=7",
        "--delete-after",
    ])
    .unwrap();

    match &cli.command {
        Commands::Run(args) => {
            assert_eq!(args.params, vec!["metric=views", "days=7"]);
            assert!(args.delete_after);
        }
        other => panic!("unexpected command: {other:?}"),
    }

    let download = cli.download_config();
    assert_eq!(download.concurrency, 5);
    assert_eq!(download.max_attempts, 3);
    assert_eq!(download.backoff_base, Duration::from_secs(2));
    assert!(download.verify_checksums);
    assert!(download.merge);
    assert!(!download.overwrite);

    let limits = cli.rate_limit_config();
    assert_eq!(limits.hourly_capacity, 970);
    assert_eq!(limits.per_minute_capacity, 97);

    let poll = cli.poll_config();
    assert_eq!(poll.interval, Duration::from_secs(10));
    assert_eq!(poll.max_attempts, 360);
    assert_eq!(cli.output_format, OutputFormat::Human);
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "report-segment-downloader",
        "resume",
        "--request-id",
        "r-42",
        "--concurrency",
        "8",
        "--hourly-limit",
        "500",
        "--minute-limit",
        "50",
        "--safety-ratio",
        "0.5",
        "--overwrite",
        "--no-merge",
        "--output-format",
        "json",
    ])
    .unwrap();

    match &cli.command {
        Commands::Resume(args) => assert_eq!(args.request_id, "r-42"),
        other => panic!("unexpected command: {other:?}"),
    }
    assert_eq!(cli.download_config().concurrency, 8);
    assert!(cli.download_config().overwrite);
    assert!(!cli.download_config().merge);
    assert_eq!(cli.rate_limit_config().hourly_capacity, 250);
    assert_eq!(cli.rate_limit_config().per_minute_capacity, 25);
    assert_eq!(cli.output_format, OutputFormat::Json);
}

#[test]
fn test_invalid_values_are_rejected() {
    for args in [
        vec!["rsd", "status", "--request-id", "r", "--concurrency", "0"],
        vec!["rsd", "status", "--request-id", "r", "--concurrency", "64"],
        vec!["rsd", "status", "--request-id", "r", "--max-attempts", "0"],
        vec!["rsd", "status", "--request-id", "r", "--safety-ratio", "1.5"],
        vec!["rsd", "resume"],
        vec!["rsd", "merge"],
    ] {
        assert!(Cli::try_parse_from(&args).is_err(), "accepted {args:?}");
    }
}

#[test]
fn test_merge_command_needs_no_api() {
    let cli = Cli::try_parse_from(["rsd", "merge", "--dir", "out/req/instance-1"]).unwrap();
    match &cli.command {
        Commands::Merge(args) => {
            assert_eq!(args.dir.to_str(), Some("out/req/instance-1"));
            assert!(args.output.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}
