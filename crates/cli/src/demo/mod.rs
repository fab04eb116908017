//! Demo topology orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{Demo, DemoConfig};
pub use stats::DemoStats;
