//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::EngineConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo<'a> {
    config: &'a EngineConfig,
    derived: DerivedInfo,
}

/// Values the engine derives from the configuration at startup
#[derive(Serialize)]
struct DerivedInfo {
    broadcast_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    worst_round_ms: Option<u64>,
    max_task_attempts: u32,
}

impl DerivedInfo {
    fn from_config(config: &EngineConfig) -> Self {
        let timeout_ms = config.multiplier.timeout().map(|t| t.as_millis() as u64);
        Self {
            broadcast_mode: if timeout_ms.is_some() { "timeout" } else { "blocking" },
            // One subscriber per barrier node; the shared timer re-arms once per slow subscriber
            worst_round_ms: timeout_ms.map(|t| t * config.barrier.node_count as u64),
            max_task_attempts: config.supervision.max_retries.saturating_add(1),
        }
    }
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let derived = DerivedInfo::from_config(&config);

    if args.json {
        let info = ConfigInfo {
            config: &config,
            derived,
        };
        let json = serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, &derived);
    }

    Ok(())
}

fn print_config_info(config: &EngineConfig, derived: &DerivedInfo) {
    println!("Engine Configuration ({:?})", config.version);
    println!("========================\n");

    println!("Streams");
    println!("  default_capacity: {}", config.streams.default_capacity);

    println!("\nSupervision");
    println!("  recover_on_panic: {}", config.supervision.recover_on_panic);
    println!("  max_retries: {} ({} attempts)", config.supervision.max_retries, derived.max_task_attempts);
    println!("  cancel_on_fail: {}", config.supervision.cancel_on_fail);
    println!(
        "  close_output_inlets_on_exit: {}",
        config.supervision.close_output_inlets_on_exit
    );

    println!("\nMultiplier");
    println!("  mode: {}", derived.broadcast_mode);
    if let Some(worst) = derived.worst_round_ms {
        println!("  timeout_ms: {}", config.multiplier.timeout_ms);
        println!("  worst-case round with every node slow: {}ms", worst);
    }

    println!("\nBarrier");
    println!("  node_count: {}", config.barrier.node_count);
}
