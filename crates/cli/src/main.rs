//! # flowctl
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 示例拓扑编排与生命周期管理
//! - 优雅关闭处理

mod cli;
mod commands;
mod demo;
mod error;

use anyhow::Result;
use clap::Parser;
use observability::TracingConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_demo, run_info, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging based on CLI options
    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "flowctl starting");

    // Execute command
    let result = match &cli.command {
        Commands::Run(args) => run_demo(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
fn init_logging(cli: &Cli) -> Result<()> {
    observability::init_tracing(&tracing_config(cli))
}

fn tracing_config(cli: &Cli) -> TracingConfig {
    let format = cli.log_format.clone().into();
    if cli.quiet {
        return TracingConfig::new(format, "warn").fixed();
    }
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    TracingConfig::new(format, level)
}
