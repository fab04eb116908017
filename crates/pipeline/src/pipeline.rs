//! Pipeline - registry of named segments

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use contracts::{Address, PipelineError, Role};
use streams::{Flow, FlowOptions, Segment, Sink, Source};
use supervisor::Context;
use tracing::{debug, instrument};

/// Object-safe start for a registered entity
trait Entity: Send + 'static {
    fn start(self: Box<Self>, ctx: &Context, opts: FlowOptions);
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Flow> Entity for T {
    fn start(self: Box<Self>, ctx: &Context, opts: FlowOptions) {
        (*self).flow(ctx, opts);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

type SinkCaster<V> = fn(&mut dyn Any) -> Option<&mut dyn Sink<In = V>>;
type SourceCaster<V> = fn(&mut dyn Any) -> Option<&mut dyn Source<Out = V>>;

fn cast_sink<T: Sink>(entity: &mut dyn Any) -> Option<&mut dyn Sink<In = T::In>> {
    entity
        .downcast_mut::<T>()
        .map(|t| t as &mut dyn Sink<In = T::In>)
}

fn cast_source<T: Source>(entity: &mut dyn Any) -> Option<&mut dyn Source<Out = T::Out>> {
    entity
        .downcast_mut::<T>()
        .map(|t| t as &mut dyn Source<Out = T::Out>)
}

/// One registered entity and the typed views routing can take of it
struct Node {
    entity: Box<dyn Entity>,
    /// Boxed `SinkCaster<T::In>`
    sink: Option<Box<dyn Any + Send + Sync>>,
    /// Boxed `SourceCaster<T::Out>`
    source: Option<Box<dyn Any + Send + Sync>>,
    type_name: &'static str,
    opts: FlowOptions,
}

/// Named segments plus the topology wired between them
///
/// Routing binds streams into the registered segments; nothing runs until
/// the pipeline itself is started through [`Flow::flow`].
pub struct Pipeline {
    nodes: Vec<Node>,
    sources: HashMap<Address, usize>,
    sinks: HashMap<Address, usize>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            sources: HashMap::new(),
            sinks: HashMap::new(),
        }
    }

    /// Register a full segment under `address` as both source and sink
    pub fn set_segment<S: Segment>(&mut self, address: impl Into<Address>, segment: S, opts: FlowOptions) {
        let address = address.into();
        let index = self.push(Node {
            entity: Box::new(segment),
            sink: Some(Box::new(cast_sink::<S> as SinkCaster<S::In>)),
            source: Some(Box::new(cast_source::<S> as SourceCaster<S::Out>)),
            type_name: std::any::type_name::<S>(),
            opts,
        });
        self.sinks.insert(address.clone(), index);
        self.sources.insert(address, index);
    }

    /// Register a sink-only entity
    pub fn set_sink<S: Sink + Flow>(&mut self, address: impl Into<Address>, sink: S, opts: FlowOptions) {
        let index = self.push(Node {
            entity: Box::new(sink),
            sink: Some(Box::new(cast_sink::<S> as SinkCaster<S::In>)),
            source: None,
            type_name: std::any::type_name::<S>(),
            opts,
        });
        self.sinks.insert(address.into(), index);
    }

    /// Register a source-only entity
    pub fn set_source<S: Source + Flow>(&mut self, address: impl Into<Address>, source: S, opts: FlowOptions) {
        let index = self.push(Node {
            entity: Box::new(source),
            sink: None,
            source: Some(Box::new(cast_source::<S> as SourceCaster<S::Out>)),
            type_name: std::any::type_name::<S>(),
            opts,
        });
        self.sources.insert(address.into(), index);
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn has_sink(&self, address: &Address) -> bool {
        self.sinks.contains_key(address)
    }

    pub fn has_source(&self, address: &Address) -> bool {
        self.sources.contains_key(address)
    }

    /// Number of distinct entities that will be started
    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sink registered at `address`, viewed with input type `V`
    pub fn sink_mut<V: Send + 'static>(&mut self, address: &Address) -> Result<&mut dyn Sink<In = V>, PipelineError> {
        let index = *self
            .sinks
            .get(address)
            .ok_or_else(|| PipelineError::not_found(address, Role::Sink))?;
        let node = &mut self.nodes[index];
        let caster = node
            .sink
            .as_ref()
            .and_then(|c| c.downcast_ref::<SinkCaster<V>>())
            .copied()
            .ok_or_else(|| PipelineError::type_mismatch::<V>(address, Role::Sink))?;
        caster(node.entity.as_any_mut()).ok_or_else(|| PipelineError::type_mismatch::<V>(address, Role::Sink))
    }

    /// Source registered at `address`, viewed with output type `V`
    pub fn source_mut<V: Send + 'static>(
        &mut self,
        address: &Address,
    ) -> Result<&mut dyn Source<Out = V>, PipelineError> {
        let index = *self
            .sources
            .get(address)
            .ok_or_else(|| PipelineError::not_found(address, Role::Source))?;
        let node = &mut self.nodes[index];
        let caster = node
            .source
            .as_ref()
            .and_then(|c| c.downcast_ref::<SourceCaster<V>>())
            .copied()
            .ok_or_else(|| PipelineError::type_mismatch::<V>(address, Role::Source))?;
        caster(node.entity.as_any_mut()).ok_or_else(|| PipelineError::type_mismatch::<V>(address, Role::Source))
    }

    /// Registered entity at `address`, if it has concrete type `T`
    pub fn entity_mut<T: 'static>(&mut self, address: &Address) -> Option<&mut T> {
        let index = *self.sources.get(address).or_else(|| self.sinks.get(address))?;
        self.nodes[index].entity.as_any_mut().downcast_mut::<T>()
    }

    /// Indices still referenced by an address, in registration order
    fn live(&self) -> BTreeSet<usize> {
        self.sources.values().chain(self.sinks.values()).copied().collect()
    }

    fn address_of(&self, index: usize) -> Option<&Address> {
        self.sources
            .iter()
            .chain(self.sinks.iter())
            .find(|(_, i)| **i == index)
            .map(|(address, _)| address)
    }
}

impl Flow for Pipeline {
    /// Start every registered entity exactly once
    ///
    /// Each entity runs with `opts` merged with its own registration options
    /// and its address as task key.
    #[instrument(name = "pipeline_flow", skip_all, fields(entities = self.len()))]
    fn flow(mut self, ctx: &Context, opts: FlowOptions) {
        let live = self.live();
        let keys: HashMap<usize, Address> = live
            .iter()
            .filter_map(|&i| self.address_of(i).map(|a| (i, a.clone())))
            .collect();

        for (index, node) in self.nodes.drain(..).enumerate() {
            let Some(address) = keys.get(&index) else {
                continue;
            };
            debug!(address = %address, entity = node.type_name, "starting pipeline entity");
            let merged = opts.clone().key(address.as_str()).merge(node.opts);
            node.entity.start(ctx, merged);
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sources: Vec<_> = self.sources.keys().map(Address::as_str).collect();
        let mut sinks: Vec<_> = self.sinks.keys().map(Address::as_str).collect();
        sources.sort_unstable();
        sinks.sort_unstable();
        f.debug_struct("Pipeline")
            .field("sources", &sources)
            .field("sinks", &sinks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{connect, must_connect};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use streams::{Emitter, Observer, Transform};
    use tokio::time::timeout;

    /// Counts how often it is started
    struct Counted {
        starts: Arc<AtomicUsize>,
        keys: Arc<Mutex<Vec<String>>>,
    }

    impl Sink for Counted {
        type In = u32;
        fn in_from(&mut self, _: Vec<streams::Outlet<u32>>) {}
    }

    impl Source for Counted {
        type Out = u32;
        fn out_to(&mut self, _: Vec<streams::Inlet<u32>>) {}
    }

    impl Flow for Counted {
        fn flow(self, _: &Context, opts: FlowOptions) {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.keys.lock().unwrap().push(opts.key_or("unset"));
        }
    }

    fn counted(starts: &Arc<AtomicUsize>, keys: &Arc<Mutex<Vec<String>>>) -> Counted {
        Counted {
            starts: starts.clone(),
            keys: keys.clone(),
        }
    }

    #[test]
    fn test_every_entity_started_once() {
        let starts = Arc::new(AtomicUsize::new(0));
        let keys = Arc::new(Mutex::new(Vec::new()));
        let mut p = Pipeline::new();
        p.set_segment("both", counted(&starts, &keys), FlowOptions::new());
        p.set_source("source_only", counted(&starts, &keys), FlowOptions::new());
        p.set_sink("sink_only", counted(&starts, &keys), FlowOptions::new());
        assert_eq!(p.len(), 3);

        let ctx = Context::new("test");
        p.flow(&ctx, FlowOptions::new().key("pipeline"));
        assert_eq!(starts.load(Ordering::SeqCst), 3);

        let mut keys = keys.lock().unwrap().clone();
        keys.sort();
        assert_eq!(keys, vec!["both", "sink_only", "source_only"]);
    }

    #[test]
    fn test_replaced_entity_is_not_started() {
        let starts = Arc::new(AtomicUsize::new(0));
        let keys = Arc::new(Mutex::new(Vec::new()));
        let mut p = Pipeline::new();
        p.set_segment("a", counted(&starts, &keys), FlowOptions::new());
        p.set_segment("a", counted(&starts, &keys), FlowOptions::new());
        assert_eq!(p.len(), 1);
        p.flow(&Context::new("test"), FlowOptions::new());
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lookup_errors() {
        let mut p = Pipeline::new();
        p.set_segment("double", Transform::linear(|v: u32| v * 2), FlowOptions::new());

        assert!(matches!(
            p.sink_mut::<u32>(&Address::new("missing")),
            Err(PipelineError::AddressNotFound { role: Role::Sink, .. })
        ));
        assert!(matches!(
            p.source_mut::<String>(&Address::new("double")),
            Err(PipelineError::TypeMismatch { role: Role::Source, .. })
        ));
        assert!(p.sink_mut::<u32>(&Address::new("double")).is_ok());
    }

    #[test]
    fn test_source_only_entity_is_not_a_sink() {
        let mut p = Pipeline::new();
        p.set_source(
            "emitter",
            Emitter::new(Duration::from_millis(1), |_, t| Ok(Some(t))),
            FlowOptions::new(),
        );
        assert!(p.has_source(&Address::new("emitter")));
        assert!(!p.has_sink(&Address::new("emitter")));
        assert!(connect::<u64>(&mut p, "double", "emitter", 1).is_err());
    }

    #[tokio::test]
    async fn test_linear_pipeline_runs_to_completion() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut observer = Observer::new();
        let s = seen.clone();
        observer.on_change(move |_, v: &u64| s.lock().unwrap().push(*v));

        let mut p = Pipeline::new();
        p.set_source(
            "emitter",
            Emitter::new(Duration::from_millis(1), |_, t| Ok((t < 5).then_some(t))),
            FlowOptions::new(),
        );
        p.set_segment("square", Transform::linear(|v: u64| v * v), FlowOptions::new());
        p.set_sink("observer", observer, FlowOptions::new());
        must_connect::<u64>(&mut p, "emitter", "square", 1);
        must_connect::<u64>(&mut p, "square", "observer", 1);

        let ctx = Context::new("test");
        p.flow(&ctx, FlowOptions::new().close_output_inlets_on_exit());
        let result = timeout(Duration::from_secs(2), ctx.wait()).await.unwrap();
        assert_eq!(result, Ok(()));
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 4, 9, 16]);
    }
}
