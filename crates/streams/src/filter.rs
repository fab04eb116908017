//! Filter - accept or reject values

use std::sync::Arc;

use contracts::FlowError;
use supervisor::Context;

use crate::base::{UnarySink, UnarySource};
use crate::options::FlowOptions;
use crate::segment::{Flow, Sink, Source};
use crate::stream::{Inlet, Outlet};

/// Filter predicate; `Err` ends the task
pub type FilterFn<V> = Arc<dyn Fn(&Context, &V) -> Result<bool, FlowError> + Send + Sync>;

/// Forwards accepted values; rejected values go to the rejects inlet if one
/// is bound, otherwise they are dropped
pub struct Filter<V> {
    sink: UnarySink<V>,
    source: UnarySource<V>,
    rejects: Option<Inlet<V>>,
    func: FilterFn<V>,
}

impl<V: Send + 'static> Filter<V> {
    pub fn new(func: impl Fn(&Context, &V) -> Result<bool, FlowError> + Send + Sync + 'static) -> Self {
        Self {
            sink: UnarySink::new(),
            source: UnarySource::new(),
            rejects: None,
            func: Arc::new(func),
        }
    }

    /// Bind the rejects output
    pub fn out_rejects_to(&mut self, inlet: Inlet<V>) {
        self.rejects = Some(inlet);
    }
}

impl<V: Send + 'static> Sink for Filter<V> {
    type In = V;

    fn in_from(&mut self, outlets: Vec<Outlet<V>>) {
        self.sink.in_from(outlets);
    }
}

impl<V: Send + 'static> Source for Filter<V> {
    type Out = V;

    fn out_to(&mut self, inlets: Vec<Inlet<V>>) {
        self.source.out_to(inlets);
    }
}

impl<V: Send + 'static> Flow for Filter<V> {
    fn flow(self, ctx: &Context, opts: FlowOptions) {
        let key = opts.key_or("filter");
        let outlet = self.sink.bound(&key);
        let accepted = self.source.bound(&key);
        let rejects = self.rejects;
        let func = self.func;
        let go = opts.go_options(&key, (accepted.clone(), rejects.clone()));
        ctx.go(
            move |ctx| {
                let (outlet, accepted, rejects, func) =
                    (outlet.clone(), accepted.clone(), rejects.clone(), func.clone());
                async move {
                    while let Some(value) = outlet.recv_or_cancel(&ctx).await? {
                        if func(&ctx, &value)? {
                            accepted.send_or_cancel(&ctx, value).await?;
                        } else if let Some(rejects) = &rejects {
                            rejects.send_or_cancel(&ctx, value).await?;
                        }
                    }
                    Ok(())
                }
            },
            go,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach::attach;
    use crate::stream::Stream;

    async fn drain(outlet: &Outlet<i32>) -> Vec<i32> {
        let mut out = Vec::new();
        while let Some(v) = outlet.recv().await {
            out.push(v);
        }
        out
    }

    #[tokio::test]
    async fn test_filter_drops_rejects_without_inlet() {
        let ctx = Context::new("test");
        let mut f = Filter::new(|_, v: &i32| Ok(*v > 0));
        let (input, output) = attach(&mut f, 8);
        f.flow(&ctx, FlowOptions::new().close_output_inlets_on_exit());

        for v in [-1, 2, -3, 4] {
            input.send(v).await.unwrap();
        }
        input.close();
        assert_eq!(drain(&output).await, vec![2, 4]);
        assert_eq!(ctx.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn test_filter_routes_rejects() {
        let ctx = Context::new("test");
        let mut f = Filter::new(|_, v: &i32| Ok(*v > 0));
        let (input, output) = attach(&mut f, 8);
        let rejects = Stream::new(8);
        f.out_rejects_to(rejects.inlet());
        f.flow(&ctx, FlowOptions::new().close_output_inlets_on_exit());

        for v in [-1, 2, -3, 4] {
            input.send(v).await.unwrap();
        }
        input.close();
        assert_eq!(drain(&output).await, vec![2, 4]);
        assert_eq!(drain(&rejects.outlet()).await, vec![-1, -3]);
    }
}
