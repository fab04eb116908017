//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the dataflow engine.
//! Business crates depend on this crate only, reverse dependencies are prohibited.
//!
//! ## Contents
//! - [`Address`]: routing key for segments, inlets and outlets
//! - [`FlowError`]: runtime failures surfaced through a supervision context
//! - [`PipelineError`]: construction-time topology failures
//! - [`EngineConfig`]: declarative engine configuration

mod address;
mod engine_config;
mod error;

pub use address::Address;
pub use engine_config::*;
pub use error::*;
