//! Segment capability traits

use std::collections::HashMap;

use contracts::Address;
use supervisor::Context;

use crate::options::FlowOptions;
use crate::stream::{Inlet, Outlet};

/// Receives values from bound outlets
pub trait Sink: Send + 'static {
    /// Input value type
    type In: Send + 'static;

    /// Bind input outlets
    ///
    /// Unary sinks panic unless given exactly one outlet.
    fn in_from(&mut self, outlets: Vec<Outlet<Self::In>>);
}

/// Sends values to bound inlets
pub trait Source: Send + 'static {
    /// Output value type
    type Out: Send + 'static;

    /// Bind output inlets
    fn out_to(&mut self, inlets: Vec<Inlet<Self::Out>>);
}

/// Starts the processing loop(s) of a segment
pub trait Flow: Send + 'static {
    /// Start every task of this segment under `ctx`
    ///
    /// Consumes the segment; each instance runs at most once.
    fn flow(self, ctx: &Context, opts: FlowOptions)
    where
        Self: Sized;
}

/// A full processing stage: sink, source and flow
pub trait Segment: Sink + Source + Flow {}

impl<T: Sink + Source + Flow> Segment for T {}

/// Output inlets a segment releases when its task exits
pub trait CloseInlets: Send + Sync + 'static {
    /// Release one closer on every held inlet
    fn close_inlets(&self);
}

impl CloseInlets for () {
    fn close_inlets(&self) {}
}

impl<V: Send + 'static> CloseInlets for Inlet<V> {
    fn close_inlets(&self) {
        self.close();
    }
}

impl<V: Send + 'static> CloseInlets for Option<Inlet<V>> {
    fn close_inlets(&self) {
        if let Some(inlet) = self {
            inlet.close();
        }
    }
}

impl<V: Send + 'static> CloseInlets for Vec<Inlet<V>> {
    fn close_inlets(&self) {
        for inlet in self {
            inlet.close();
        }
    }
}

impl<V: Send + 'static> CloseInlets for HashMap<Address, Inlet<V>> {
    fn close_inlets(&self) {
        for inlet in self.values() {
            inlet.close();
        }
    }
}

impl<A: CloseInlets, B: CloseInlets> CloseInlets for (A, B) {
    fn close_inlets(&self) {
        self.0.close_inlets();
        self.1.close_inlets();
    }
}
