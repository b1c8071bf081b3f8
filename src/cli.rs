// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `jobgraph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobgraph",
    version,
    about = "Run a DAG of shell tasks as one job under a guarded scheduler.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Jobgraph.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Jobgraph.toml")]
    pub config: String,

    /// Override the job name from `[job].name`.
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBGRAPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task graph, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Mark unfinished persisted jobs as aborted, then exit.
    #[arg(long, conflicts_with_all = ["dry_run", "list_records"])]
    pub recover_only: bool,

    /// Print persisted job records, then exit.
    #[arg(long, conflicts_with = "dry_run")]
    pub list_records: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
