//! Boundary streams for driving a segment directly

use crate::segment::{Segment, Sink, Source};
use crate::stream::{Inlet, Outlet, Stream};

/// Bind a new input stream to `sink` and return its inlet
///
/// The caller owns the inlet and closes it to end the input.
pub fn attach_sink<S: Sink>(sink: &mut S, capacity: usize) -> Inlet<S::In> {
    let stream = Stream::new(capacity);
    sink.in_from(vec![stream.outlet()]);
    stream.inlet()
}

/// Bind a new output stream to `source` and return its outlet
///
/// One closer is acquired on behalf of the source.
pub fn attach_source<S: Source>(source: &mut S, capacity: usize) -> Outlet<S::Out> {
    let stream = Stream::new(capacity);
    stream.acquire(1);
    source.out_to(vec![stream.inlet()]);
    stream.outlet()
}

/// Attach both ends of `segment`
pub fn attach<S: Segment>(segment: &mut S, capacity: usize) -> (Inlet<S::In>, Outlet<S::Out>) {
    let inlet = attach_sink(segment, capacity);
    let outlet = attach_source(segment, capacity);
    (inlet, outlet)
}
