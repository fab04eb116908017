//! Observer - sink that notifies handlers of every value

use std::sync::Arc;

use supervisor::Context;

use crate::base::UnarySink;
use crate::options::FlowOptions;
use crate::segment::{Flow, Sink};
use crate::stream::Outlet;

/// Change handler
pub type Handler<V> = Arc<dyn Fn(&Context, &V) + Send + Sync>;

pub struct Observer<V> {
    sink: UnarySink<V>,
    handlers: Vec<Handler<V>>,
}

impl<V: Send + 'static> Default for Observer<V> {
    fn default() -> Self {
        Self {
            sink: UnarySink::new(),
            handlers: Vec::new(),
        }
    }
}

impl<V: Send + 'static> Observer<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; handlers run in registration order
    pub fn on_change(&mut self, handler: impl Fn(&Context, &V) + Send + Sync + 'static) {
        self.handlers.push(Arc::new(handler));
    }
}

impl<V: Send + 'static> Sink for Observer<V> {
    type In = V;

    fn in_from(&mut self, outlets: Vec<Outlet<V>>) {
        self.sink.in_from(outlets);
    }
}

impl<V: Send + 'static> Flow for Observer<V> {
    fn flow(self, ctx: &Context, opts: FlowOptions) {
        let key = opts.key_or("observer");
        let outlet = self.sink.bound(&key);
        let handlers = Arc::new(self.handlers);
        let go = opts.go_options(&key, ());
        ctx.go(
            move |ctx| {
                let (outlet, handlers) = (outlet.clone(), handlers.clone());
                async move {
                    while let Some(value) = outlet.recv_or_cancel(&ctx).await? {
                        for handler in handlers.iter() {
                            handler(&ctx, &value);
                        }
                    }
                    Ok(())
                }
            },
            go,
        );
    }
}
