//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// flowctl - drive and inspect the streaming dataflow engine
#[derive(Parser, Debug)]
#[command(
    name = "flowctl",
    author,
    version,
    about = "Streaming dataflow engine toolkit",
    long_about = "Loads and validates engine configuration, and runs a demo topology:\n\n\
                  a ticker feeds a stamping transform, the stamped frames are broadcast to\n\
                  N subscriber nodes with per-round timeouts, and the nodes' acknowledgements\n\
                  are merged by a barrier into one commit once the ticker is exhausted."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "FLOWCTL_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "FLOWCTL_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the demo topology
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); built-in defaults when omitted
    #[arg(short, long, env = "FLOWCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of frames the ticker emits
    #[arg(long, default_value = "100", env = "FLOWCTL_TICKS")]
    pub ticks: u64,

    /// Ticker interval in milliseconds
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: u64,

    /// Override barrier node count (one subscriber per node)
    #[arg(long, env = "FLOWCTL_NODES")]
    pub nodes: Option<usize>,

    /// Override multiplier timeout in milliseconds (0 = block)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Processing delay of the last node in milliseconds (0 = none)
    #[arg(long, default_value = "0")]
    pub slow_ms: u64,

    /// Abort the run after this many seconds (0 = no deadline)
    #[arg(long, default_value = "0", env = "FLOWCTL_DEADLINE")]
    pub deadline: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "FLOWCTL_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "engine.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "engine.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
