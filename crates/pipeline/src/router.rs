//! Router - stitch named sources to named sinks with streams

use std::collections::HashMap;
use std::marker::PhantomData;

use contracts::{Address, PipelineError, Role};
use streams::{Inlet, Outlet, Stream};
use tracing::debug;

use crate::pipeline::Pipeline;

/// Fan-in/fan-out topology used when wiring sources to sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stitch {
    /// One stream shared by every source and every sink
    #[default]
    Unary,
    /// One stream per (source, sink) pair
    Weave,
    /// One stream per sink, shared by every source
    Convergent,
}

/// Routes many sources to many sinks
/// Capacity of router-allocated streams unless set otherwise
pub const DEFAULT_CAPACITY: usize = 1;

#[derive(Debug, Clone)]
pub struct MultiRouter<V> {
    pub source_targets: Vec<Address>,
    pub sink_targets: Vec<Address>,
    pub capacity: usize,
    pub stitch: Stitch,
    _value: PhantomData<fn() -> V>,
}

impl<V: Send + 'static> MultiRouter<V> {
    pub fn new<S, T>(sources: impl IntoIterator<Item = S>, sinks: impl IntoIterator<Item = T>) -> Self
    where
        S: Into<Address>,
        T: Into<Address>,
    {
        Self {
            source_targets: sources.into_iter().map(Into::into).collect(),
            sink_targets: sinks.into_iter().map(Into::into).collect(),
            capacity: DEFAULT_CAPACITY,
            stitch: Stitch::default(),
            _value: PhantomData,
        }
    }

    /// Set stream capacity
    ///
    /// Streams always buffer at least one value; zero is raised to one.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn stitch(mut self, stitch: Stitch) -> Self {
        self.stitch = stitch;
        self
    }

    /// Allocate streams and bind them into the named segments
    ///
    /// Every address is checked before anything is bound, so a failed route
    /// leaves the pipeline untouched.
    pub fn route(&self, pipeline: &mut Pipeline) -> Result<(), PipelineError> {
        if self.source_targets.is_empty() {
            return Err(PipelineError::NoTargets { role: Role::Source });
        }
        if self.sink_targets.is_empty() {
            return Err(PipelineError::NoTargets { role: Role::Sink });
        }
        for address in &self.source_targets {
            pipeline.source_mut::<V>(address)?;
        }
        for address in &self.sink_targets {
            pipeline.sink_mut::<V>(address)?;
        }

        let (inlets, outlets) = match self.stitch {
            Stitch::Unary => self.unary(),
            Stitch::Weave => self.weave(),
            Stitch::Convergent => self.convergent(),
        };
        for (address, inlets) in inlets {
            pipeline.source_mut::<V>(&address)?.out_to(inlets);
        }
        for (address, outlets) in outlets {
            pipeline.sink_mut::<V>(&address)?.in_from(outlets);
        }

        debug!(
            sources = ?self.source_targets,
            sinks = ?self.sink_targets,
            stitch = ?self.stitch,
            capacity = self.capacity,
            "routed"
        );
        Ok(())
    }

    /// [`MultiRouter::route`], panicking on a wiring error
    ///
    /// # Panics
    ///
    /// Panics if any address is missing or has the wrong value type.
    pub fn must_route(&self, pipeline: &mut Pipeline) {
        if let Err(err) = self.route(pipeline) {
            panic!("failed to route {:?} -> {:?}: {err}", self.source_targets, self.sink_targets);
        }
    }

    fn stream(&self, source: &Address, sink: &Address, closers: usize) -> Stream<V> {
        let stream = Stream::new(self.capacity)
            .with_inlet_address(sink)
            .with_outlet_address(source);
        stream.acquire(closers as i64);
        stream
    }

    fn unary(&self) -> (Bindings<Inlet<V>>, Bindings<Outlet<V>>) {
        let stream = self.stream(
            &self.source_targets[0],
            &self.sink_targets[0],
            self.source_targets.len(),
        );
        let inlets = self
            .source_targets
            .iter()
            .map(|s| (s.clone(), vec![stream.inlet()]))
            .collect();
        let outlets = self
            .sink_targets
            .iter()
            .map(|t| (t.clone(), vec![stream.outlet()]))
            .collect();
        (inlets, outlets)
    }

    fn weave(&self) -> (Bindings<Inlet<V>>, Bindings<Outlet<V>>) {
        let mut inlets = Bindings::new();
        let mut outlets = Bindings::new();
        for source in &self.source_targets {
            for sink in &self.sink_targets {
                let stream = self.stream(source, sink, 1);
                inlets.push(source, stream.inlet());
                outlets.push(sink, stream.outlet());
            }
        }
        (inlets, outlets)
    }

    fn convergent(&self) -> (Bindings<Inlet<V>>, Bindings<Outlet<V>>) {
        let mut inlets = Bindings::new();
        let mut outlets = Bindings::new();
        for sink in &self.sink_targets {
            let stream = self.stream(&self.source_targets[0], sink, self.source_targets.len());
            for source in &self.source_targets {
                inlets.push(source, stream.inlet());
            }
            outlets.push(sink, stream.outlet());
        }
        (inlets, outlets)
    }
}

/// Per-address binding lists, kept in first-seen order
struct Bindings<T> {
    order: Vec<Address>,
    items: HashMap<Address, Vec<T>>,
}

impl<T> Bindings<T> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            items: HashMap::new(),
        }
    }

    fn push(&mut self, address: &Address, item: T) {
        if !self.items.contains_key(address) {
            self.order.push(address.clone());
        }
        self.items.entry(address.clone()).or_default().push(item);
    }
}

impl<T> FromIterator<(Address, Vec<T>)> for Bindings<T> {
    fn from_iter<I: IntoIterator<Item = (Address, Vec<T>)>>(iter: I) -> Self {
        let mut bindings = Self::new();
        for (address, items) in iter {
            for item in items {
                bindings.push(&address, item);
            }
        }
        bindings
    }
}

impl<T> IntoIterator for Bindings<T> {
    type Item = (Address, Vec<T>);
    type IntoIter = std::vec::IntoIter<(Address, Vec<T>)>;

    fn into_iter(mut self) -> Self::IntoIter {
        self.order
            .into_iter()
            .map(|address| {
                let items = self.items.remove(&address).unwrap_or_default();
                (address, items)
            })
            .collect::<Vec<_>>()
            .into_iter()
    }
}

/// Routes one source to one sink
#[derive(Debug, Clone)]
pub struct UnaryRouter<V> {
    pub source_target: Address,
    pub sink_target: Address,
    pub capacity: usize,
    _value: PhantomData<fn() -> V>,
}

impl<V: Send + 'static> UnaryRouter<V> {
    pub fn new(source: impl Into<Address>, sink: impl Into<Address>, capacity: usize) -> Self {
        Self {
            source_target: source.into(),
            sink_target: sink.into(),
            capacity,
            _value: PhantomData,
        }
    }

    pub fn route(&self, pipeline: &mut Pipeline) -> Result<(), PipelineError> {
        MultiRouter::<V>::new([&self.source_target], [&self.sink_target])
            .capacity(self.capacity)
            .route(pipeline)
    }

    /// # Panics
    ///
    /// Panics if either address is missing or has the wrong value type.
    pub fn must_route(&self, pipeline: &mut Pipeline) {
        MultiRouter::<V>::new([&self.source_target], [&self.sink_target])
            .capacity(self.capacity)
            .must_route(pipeline);
    }
}

/// Connect `source` to `sink` with a single stream
pub fn connect<V: Send + 'static>(
    pipeline: &mut Pipeline,
    source: impl Into<Address>,
    sink: impl Into<Address>,
    capacity: usize,
) -> Result<(), PipelineError> {
    UnaryRouter::<V>::new(source, sink, capacity).route(pipeline)
}

/// [`connect`], panicking on a wiring error
pub fn must_connect<V: Send + 'static>(
    pipeline: &mut Pipeline,
    source: impl Into<Address>,
    sink: impl Into<Address>,
    capacity: usize,
) {
    UnaryRouter::<V>::new(source, sink, capacity).must_route(pipeline);
}
