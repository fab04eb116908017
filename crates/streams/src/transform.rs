//! Transform - one input value to at most one output value

use std::sync::Arc;

use contracts::FlowError;
use supervisor::Context;
use tracing::trace;

use crate::base::{UnarySink, UnarySource};
use crate::options::FlowOptions;
use crate::segment::{Flow, Sink, Source};
use crate::stream::{Inlet, Outlet};

/// Transform function
///
/// `Ok(None)` drops the value; `Err` ends the task with that failure.
pub type TransformFn<I, O> = Arc<dyn Fn(&Context, I) -> Result<Option<O>, FlowError> + Send + Sync>;

/// Reads one value, applies a fallible function, forwards the result
pub struct Transform<I, O> {
    sink: UnarySink<I>,
    source: UnarySource<O>,
    func: TransformFn<I, O>,
}

impl<I: Send + 'static, O: Send + 'static> Transform<I, O> {
    pub fn new(
        func: impl Fn(&Context, I) -> Result<Option<O>, FlowError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            sink: UnarySink::new(),
            source: UnarySource::new(),
            func: Arc::new(func),
        }
    }

    /// Infallible transform that forwards every value
    pub fn linear(func: impl Fn(I) -> O + Send + Sync + 'static) -> Self {
        Self::new(move |_, value| Ok(Some(func(value))))
    }
}

impl<I: Send + 'static, O: Send + 'static> Sink for Transform<I, O> {
    type In = I;

    fn in_from(&mut self, outlets: Vec<Outlet<I>>) {
        self.sink.in_from(outlets);
    }
}

impl<I: Send + 'static, O: Send + 'static> Source for Transform<I, O> {
    type Out = O;

    fn out_to(&mut self, inlets: Vec<Inlet<O>>) {
        self.source.out_to(inlets);
    }
}

impl<I: Send + 'static, O: Send + 'static> Flow for Transform<I, O> {
    fn flow(self, ctx: &Context, opts: FlowOptions) {
        let key = opts.key_or("transform");
        let outlet = self.sink.bound(&key);
        let inlet = self.source.bound(&key);
        let func = self.func;
        let go = opts.go_options(&key, inlet.clone());
        ctx.go(
            move |ctx| {
                let (outlet, inlet, func, key) =
                    (outlet.clone(), inlet.clone(), func.clone(), key.clone());
                async move {
                    while let Some(value) = outlet.recv_or_cancel(&ctx).await? {
                        match func(&ctx, value)? {
                            Some(out) => inlet.send_or_cancel(&ctx, out).await?,
                            None => trace!(segment = %key, "transform dropped value"),
                        }
                    }
                    Ok(())
                }
            },
            go,
        );
    }
}
