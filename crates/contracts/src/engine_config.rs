//! EngineConfig - Config Loader output
//!
//! Declarative defaults for streams, supervision, the dynamic multiplier and the
//! acknowledgement barrier.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Stream defaults
    #[serde(default)]
    #[validate(nested)]
    pub streams: StreamConfig,

    /// Task supervision defaults
    #[serde(default)]
    pub supervision: SupervisionConfig,

    /// Dynamic broadcast settings
    #[serde(default)]
    pub multiplier: MultiplierConfig,

    /// Acknowledgement barrier settings
    #[serde(default)]
    #[validate(nested)]
    pub barrier: BarrierConfig,
}

/// Stream defaults
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StreamConfig {
    /// Capacity used when a router is not given one explicitly
    #[serde(default = "default_capacity")]
    #[validate(range(min = 1, max = 1_000_000))]
    pub default_capacity: usize,
}

fn default_capacity() -> usize {
    1
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            default_capacity: default_capacity(),
        }
    }
}

/// Supervision defaults applied when starting a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionConfig {
    /// Convert task panics into ordinary failures
    #[serde(default = "default_true")]
    pub recover_on_panic: bool,

    /// Restart a panicking task up to this many times
    #[serde(default)]
    pub max_retries: u32,

    /// Cancel the whole context when any task fails
    #[serde(default = "default_true")]
    pub cancel_on_fail: bool,

    /// Close every segment's output inlets when its task exits
    #[serde(default = "default_true")]
    pub close_output_inlets_on_exit: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            recover_on_panic: true,
            max_retries: 0,
            cancel_on_fail: true,
            close_output_inlets_on_exit: true,
        }
    }
}

/// Dynamic broadcast settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiplierConfig {
    /// Per-round send timeout in milliseconds (0 = block indefinitely)
    #[serde(default)]
    pub timeout_ms: u64,
}

impl MultiplierConfig {
    /// Timeout as a duration, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Acknowledgement barrier settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BarrierConfig {
    /// Number of participating nodes per cycle
    #[serde(default = "default_node_count")]
    #[validate(range(min = 1))]
    pub node_count: usize,
}

fn default_node_count() -> usize {
    1
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            node_count: default_node_count(),
        }
    }
}
