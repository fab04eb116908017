//! Delta and DeltaTransform - fixed fan-out copy

use std::sync::Arc;

use contracts::FlowError;
use streams::{Flow, FlowOptions, Inlet, MultiSource, Outlet, Sink, Source, TransformFn, UnarySink};
use supervisor::Context;

/// Copies every input value to all bound outputs
pub struct Delta<V> {
    sink: UnarySink<V>,
    source: MultiSource<V>,
}

impl<V: Clone + Send + 'static> Default for Delta<V> {
    fn default() -> Self {
        Self {
            sink: UnarySink::new(),
            source: MultiSource::new(),
        }
    }
}

impl<V: Clone + Send + 'static> Delta<V> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<V: Clone + Send + 'static> Sink for Delta<V> {
    type In = V;

    fn in_from(&mut self, outlets: Vec<Outlet<V>>) {
        self.sink.in_from(outlets);
    }
}

impl<V: Clone + Send + 'static> Source for Delta<V> {
    type Out = V;

    fn out_to(&mut self, inlets: Vec<Inlet<V>>) {
        self.source.out_to(inlets);
    }
}

impl<V: Clone + Send + 'static> Flow for Delta<V> {
    fn flow(self, ctx: &Context, opts: FlowOptions) {
        let key = opts.key_or("delta");
        let outlet = self.sink.bound(&key);
        let source = self.source;
        let go = opts.go_options(&key, source.inlets().to_vec());
        ctx.go(
            move |ctx| {
                let (outlet, source) = (outlet.clone(), source.clone());
                async move {
                    while let Some(value) = outlet.recv_or_cancel(&ctx).await? {
                        source.send_all(&ctx, value).await?;
                    }
                    Ok(())
                }
            },
            go,
        );
    }
}

/// Transforms each input value, then copies the result to all outputs
pub struct DeltaTransform<I, O> {
    sink: UnarySink<I>,
    source: MultiSource<O>,
    func: TransformFn<I, O>,
}

impl<I: Send + 'static, O: Clone + Send + 'static> DeltaTransform<I, O> {
    pub fn new(
        func: impl Fn(&Context, I) -> Result<Option<O>, FlowError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            sink: UnarySink::new(),
            source: MultiSource::new(),
            func: Arc::new(func),
        }
    }
}

impl<I: Send + 'static, O: Clone + Send + 'static> Sink for DeltaTransform<I, O> {
    type In = I;

    fn in_from(&mut self, outlets: Vec<Outlet<I>>) {
        self.sink.in_from(outlets);
    }
}

impl<I: Send + 'static, O: Clone + Send + 'static> Source for DeltaTransform<I, O> {
    type Out = O;

    fn out_to(&mut self, inlets: Vec<Inlet<O>>) {
        self.source.out_to(inlets);
    }
}

impl<I: Send + 'static, O: Clone + Send + 'static> Flow for DeltaTransform<I, O> {
    fn flow(self, ctx: &Context, opts: FlowOptions) {
        let key = opts.key_or("delta_transform");
        let outlet = self.sink.bound(&key);
        let source = self.source;
        let func = self.func;
        let go = opts.go_options(&key, source.inlets().to_vec());
        ctx.go(
            move |ctx| {
                let (outlet, source, func) = (outlet.clone(), source.clone(), func.clone());
                async move {
                    while let Some(value) = outlet.recv_or_cancel(&ctx).await? {
                        if let Some(out) = func(&ctx, value)? {
                            source.send_all(&ctx, out).await?;
                        }
                    }
                    Ok(())
                }
            },
            go,
        );
    }
}
