//! Synchronizer - barrier segment over per-node responses

use contracts::BarrierConfig;
use streams::{Flow, FlowOptions, Inlet, Outlet, Sink, Source, UnarySink, UnarySource};
use supervisor::Context;

use crate::barrier::Barrier;
use crate::response::Acknowledgement;

/// Releases one merged response per completed cycle and forwards data
/// responses as they arrive
///
/// A restarted task starts from an empty cycle.
pub struct Synchronizer<R> {
    sink: UnarySink<R>,
    source: UnarySource<R>,
    node_count: usize,
}

impl<R: Acknowledgement> Synchronizer<R> {
    pub fn new(node_count: usize) -> Self {
        Self {
            sink: UnarySink::new(),
            source: UnarySource::new(),
            node_count,
        }
    }

    pub fn from_config(config: &BarrierConfig) -> Self {
        Self::new(config.node_count)
    }
}

impl<R: Acknowledgement> Sink for Synchronizer<R> {
    type In = R;

    fn in_from(&mut self, outlets: Vec<Outlet<R>>) {
        self.sink.in_from(outlets);
    }
}

impl<R: Acknowledgement> Source for Synchronizer<R> {
    type Out = R;

    fn out_to(&mut self, inlets: Vec<Inlet<R>>) {
        self.source.out_to(inlets);
    }
}

impl<R: Acknowledgement> Flow for Synchronizer<R> {
    fn flow(self, ctx: &Context, opts: FlowOptions) {
        let key = opts.key_or("synchronizer");
        let outlet = self.sink.bound(&key);
        let inlet = self.source.bound(&key);
        let node_count = self.node_count;
        let go = opts.go_options(&key, inlet.clone());
        ctx.go(
            move |ctx| {
                let (outlet, inlet) = (outlet.clone(), inlet.clone());
                let mut barrier = Barrier::new(key.clone(), node_count);
                async move {
                    while let Some(response) = outlet.recv_or_cancel(&ctx).await? {
                        if let Some(released) = barrier.push(response) {
                            inlet.send_or_cancel(&ctx, released).await?;
                        }
                    }
                    Ok(())
                }
            },
            go,
        );
    }
}
