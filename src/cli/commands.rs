//! CLI command definitions

use clap::Args;
use std::path::PathBuf;

/// Load, decode and validate a declaration file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the declaration YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show how a pipeline's steps were resolved
#[derive(Debug, Args, Clone)]
pub struct InspectCommand {
    /// Path to the declaration YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Pipeline short or full name
    #[arg(short, long)]
    pub pipeline: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Print the backoff of each attempt of a step's retry policy
#[derive(Debug, Args, Clone)]
pub struct RetryPlanCommand {
    /// Path to the declaration YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Pipeline short or full name
    #[arg(short, long)]
    pub pipeline: String,

    /// Step as `<type>.<name>`
    #[arg(short, long)]
    pub step: String,
}

/// Upcoming firings of a schedule or query trigger
#[derive(Debug, Args, Clone)]
pub struct NextFireCommand {
    /// Path to the declaration YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Trigger short or full name
    #[arg(short, long)]
    pub trigger: String,

    /// Number of firings to show
    #[arg(short, long, default_value_t = 5)]
    pub count: usize,
}
