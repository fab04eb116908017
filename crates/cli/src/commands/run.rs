//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::EngineConfig;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::demo::{Demo, DemoConfig};
use crate::error::CliError;

/// Execute the `run` command
pub async fn run_demo(args: &RunArgs) -> Result<()> {
    let engine = load_engine_config(args)?;

    info!(
        capacity = engine.streams.default_capacity,
        nodes = engine.barrier.node_count,
        timeout_ms = engine.multiplier.timeout_ms,
        max_retries = engine.supervision.max_retries,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&engine, args);
        return Ok(());
    }

    let demo_config = DemoConfig {
        engine,
        ticks: args.ticks,
        interval: Duration::from_millis(args.interval_ms),
        slow_delay: (args.slow_ms > 0).then(|| Duration::from_millis(args.slow_ms)),
        deadline: (args.deadline > 0).then(|| Duration::from_secs(args.deadline)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    let demo = Demo::new(demo_config);
    let shutdown_signal = setup_shutdown_signal();

    info!("Starting demo topology...");

    match demo.run_until(shutdown_signal).await {
        Ok(stats) => {
            info!(
                rounds = stats.multiplier.round_count,
                timeouts = stats.multiplier.timeout_count,
                released = stats.commit.is_some(),
                duration_secs = stats.duration.as_secs_f64(),
                "Demo completed"
            );
            stats.print_summary();
        }
        Err(CliError::Interrupted) => warn!("Received shutdown signal, demo stopped"),
        Err(err) => return Err(err).context("Demo execution failed"),
    }

    info!("flowctl finished");
    Ok(())
}

/// Load the configuration file (or defaults) and apply CLI overrides
fn load_engine_config(args: &RunArgs) -> Result<EngineConfig> {
    let mut engine = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()).into());
            }
            info!(config = %path.display(), "Loading configuration");
            config_loader::ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => {
            info!("No configuration file given, using defaults");
            EngineConfig::default()
        }
    };

    if let Some(nodes) = args.nodes {
        info!(nodes, "Overriding barrier node count from CLI");
        engine.barrier.node_count = nodes;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        info!(timeout_ms, "Overriding multiplier timeout from CLI");
        engine.multiplier.timeout_ms = timeout_ms;
    }

    config_loader::ConfigLoader::validate(&engine).context("Invalid CLI overrides")?;
    Ok(engine)
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never resolves.
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(engine: &EngineConfig, args: &RunArgs) {
    println!("\n=== Configuration Summary ===\n");
    println!("Streams:");
    println!("  Default capacity: {}", engine.streams.default_capacity);
    println!("\nSupervision:");
    println!("  Recover on panic: {}", engine.supervision.recover_on_panic);
    println!("  Max retries: {}", engine.supervision.max_retries);
    println!("  Cancel on fail: {}", engine.supervision.cancel_on_fail);
    println!("\nBroadcast:");
    match engine.multiplier.timeout() {
        Some(timeout) => println!("  Timeout: {}ms", timeout.as_millis()),
        None => println!("  Timeout: disabled (blocking)"),
    }
    println!("\nBarrier:");
    println!("  Nodes: {}", engine.barrier.node_count);
    println!("\nDemo:");
    println!("  Ticks: {} every {}ms", args.ticks, args.interval_ms);
    if args.slow_ms > 0 {
        println!("  Slow node delay: {}ms", args.slow_ms);
    }
    println!();
}
