//! # Pipeline
//!
//! Topology composition over named segments.
//!
//! Responsibilities:
//! - Register segments under addresses (`Pipeline`)
//! - Wire sources to sinks with a chosen stitch (`MultiRouter`, `UnaryRouter`, `connect`)
//! - Expose a routed pipeline as a single segment (`Segment`)
//!
//! ## Usage Example
//!
//! ```ignore
//! use pipeline::{must_connect, MultiRouter, Pipeline, Segment, Stitch};
//! use streams::{FlowOptions, Transform};
//!
//! let mut p = Pipeline::new();
//! p.set_segment("parse", Transform::linear(parse), FlowOptions::new());
//! p.set_segment("local", local_writer, FlowOptions::new().close_output_inlets_on_exit());
//! p.set_segment("remote", remote_writer, FlowOptions::new().close_output_inlets_on_exit());
//! MultiRouter::<Request>::new(["parse"], ["local", "remote"])
//!     .stitch(Stitch::Weave)
//!     .must_route(&mut p);
//!
//! let mut seg = Segment::<Raw, Response>::new(p);
//! seg.must_route_inlet_to(["parse"]);
//! seg.must_route_outlet_from(["local", "remote"]);
//! ```

mod pipeline;
mod router;
mod segment;

// Re-exports
pub use pipeline::Pipeline;
pub use router::{connect, must_connect, MultiRouter, Stitch, UnaryRouter, DEFAULT_CAPACITY};
pub use segment::Segment;
