//! CLI command implementations

pub mod args;
pub mod commands;
pub mod error;
pub mod progress;

pub use args::{Cli, Commands, MergeArgs, OutputFormat, RequestArgs, ResumeArgs, RunArgs};
pub use commands::parse_params;
pub use error::CliError;
pub use progress::BarProgress;
