//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{InspectCommand, NextFireCommand, RetryPlanCommand, ValidateCommand};
use std::ffi::OsString;

/// Declarative pipeline definitions
#[derive(Debug, Parser, Clone)]
#[command(name = "flowdef")]
#[command(version = "0.1.0")]
#[command(about = "Validate and inspect declarative pipeline definitions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Validate a declaration file
    Validate(ValidateCommand),

    /// Show dependencies, deferred attributes and execution order of a pipeline
    Inspect(InspectCommand),

    /// Show the retry backoff of a step
    RetryPlan(RetryPlanCommand),

    /// Show upcoming trigger firings
    NextFire(NextFireCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
