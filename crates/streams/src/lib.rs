//! # Streams
//!
//! Stream primitives and single-input segments.
//!
//! Responsibilities:
//! - `Stream` with addressable `Inlet`/`Outlet` halves and reference-counted close
//! - Segment capability traits (`Sink`, `Source`, `Flow`)
//! - Reusable binding parts (unary, multi and addressable sources)
//! - Transform, Filter, Emitter and Observer segments
//!
//! ## Usage Example
//!
//! ```ignore
//! use streams::{attach, Flow, FlowOptions, Transform};
//! use supervisor::Context;
//!
//! let ctx = Context::new("example");
//! let mut double = Transform::linear(|v: u32| v * 2);
//! let (input, output) = attach(&mut double, 16);
//! double.flow(&ctx, FlowOptions::new().close_output_inlets_on_exit());
//!
//! input.send(21).await?;
//! input.close();
//! assert_eq!(output.recv().await, Some(42));
//! ```

mod attach;
mod base;
mod emitter;
mod filter;
mod observer;
mod options;
mod segment;
mod stream;
mod transform;

// Re-exports
pub use attach::{attach, attach_sink, attach_source};
pub use base::{AddressableSource, DuplicatePolicy, MultiSource, UnarySink, UnarySource};
pub use emitter::{EmitFn, Emitter};
pub use filter::{Filter, FilterFn};
pub use observer::{Handler, Observer};
pub use options::FlowOptions;
pub use segment::{CloseInlets, Flow, Segment, Sink, Source};
pub use stream::{Inlet, Outlet, Stream};
pub use transform::{Transform, TransformFn};
