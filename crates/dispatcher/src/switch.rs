//! Switch and BatchSwitch - address-resolved dispatch

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{Address, FlowError};
use streams::{AddressableSource, DuplicatePolicy, Flow, FlowOptions, Inlet, Outlet, Sink, Source, UnarySink};
use supervisor::Context;
use tracing::trace;

/// Resolves a value to its target address; `Ok(None)` drops the value
pub type SwitchFn<V> = Arc<dyn Fn(&Context, &V) -> Result<Option<Address>, FlowError> + Send + Sync>;

/// Splits one input into per-address outputs
pub type BatchSwitchFn<I, O> =
    Arc<dyn Fn(&Context, I, &mut HashMap<Address, O>) -> Result<(), FlowError> + Send + Sync>;

/// Forwards each value to the output bound at the resolved address
///
/// An address with no bound output is a fatal task failure.
pub struct Switch<V> {
    sink: UnarySink<V>,
    source: AddressableSource<V>,
    func: SwitchFn<V>,
}

impl<V: Send + 'static> Switch<V> {
    pub fn new(
        func: impl Fn(&Context, &V) -> Result<Option<Address>, FlowError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            sink: UnarySink::new(),
            source: AddressableSource::new(),
            func: Arc::new(func),
        }
    }

    /// Set how duplicate output addresses are handled
    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.source = AddressableSource::with_policy(policy);
        self
    }
}

impl<V: Send + 'static> Sink for Switch<V> {
    type In = V;

    fn in_from(&mut self, outlets: Vec<Outlet<V>>) {
        self.sink.in_from(outlets);
    }
}

impl<V: Send + 'static> Source for Switch<V> {
    type Out = V;

    fn out_to(&mut self, inlets: Vec<Inlet<V>>) {
        self.source.out_to(inlets);
    }
}

impl<V: Send + 'static> Flow for Switch<V> {
    fn flow(self, ctx: &Context, opts: FlowOptions) {
        let key = opts.key_or("switch");
        let outlet = self.sink.bound(&key);
        let source = self.source;
        let func = self.func;
        let go = opts.go_options(&key, source.inlets().clone());
        ctx.go(
            move |ctx| {
                let (outlet, source, func) = (outlet.clone(), source.clone(), func.clone());
                async move {
                    while let Some(value) = outlet.recv_or_cancel(&ctx).await? {
                        match func(&ctx, &value)? {
                            Some(address) => source.send_to(&ctx, &address, value).await?,
                            None => trace!("switch dropped value"),
                        }
                    }
                    Ok(())
                }
            },
            go,
        );
    }
}

/// Splits each input into any number of per-address outputs
pub struct BatchSwitch<I, O> {
    sink: UnarySink<I>,
    source: AddressableSource<O>,
    func: BatchSwitchFn<I, O>,
}

impl<I: Send + 'static, O: Send + 'static> BatchSwitch<I, O> {
    pub fn new(
        func: impl Fn(&Context, I, &mut HashMap<Address, O>) -> Result<(), FlowError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            sink: UnarySink::new(),
            source: AddressableSource::new(),
            func: Arc::new(func),
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> Sink for BatchSwitch<I, O> {
    type In = I;

    fn in_from(&mut self, outlets: Vec<Outlet<I>>) {
        self.sink.in_from(outlets);
    }
}

impl<I: Send + 'static, O: Send + 'static> Source for BatchSwitch<I, O> {
    type Out = O;

    fn out_to(&mut self, inlets: Vec<Inlet<O>>) {
        self.source.out_to(inlets);
    }
}

impl<I: Send + 'static, O: Send + 'static> Flow for BatchSwitch<I, O> {
    fn flow(self, ctx: &Context, opts: FlowOptions) {
        let key = opts.key_or("batch_switch");
        let outlet = self.sink.bound(&key);
        let source = self.source;
        let func = self.func;
        let go = opts.go_options(&key, source.inlets().clone());
        ctx.go(
            move |ctx| {
                let (outlet, source, func) = (outlet.clone(), source.clone(), func.clone());
                async move {
                    let mut batch = HashMap::new();
                    while let Some(value) = outlet.recv_or_cancel(&ctx).await? {
                        func(&ctx, value, &mut batch)?;
                        for (address, out) in batch.drain() {
                            source.send_to(&ctx, &address, out).await?;
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
    use std::time::Duration;
    use streams::{attach_sink, Stream};
    use tokio::time::timeout;

    fn output(address: &str) -> Stream<u32> {
        let stream = Stream::new(8).with_inlet_address(address);
        stream.acquire(1);
        stream
    }

    #[tokio::test]
    async fn test_switch_routes_by_address() {
        let ctx = Context::new("test");
        let (even, odd) = (output("even"), output("odd"));
        let mut switch = Switch::new(|_, v: &u32| {
            Ok(Some(Address::new(if v % 2 == 0 { "even" } else { "odd" })))
        });
        switch.out_to(vec![even.inlet(), odd.inlet()]);
        let input = attach_sink(&mut switch, 8);
        switch.flow(&ctx, FlowOptions::new().close_output_inlets_on_exit());

        for v in 0..6 {
            input.send(v).await.unwrap();
        }
        input.close();
        assert_eq!(ctx.wait().await, Ok(()));

        let (even, odd) = (even.outlet(), odd.outlet());
        let mut evens = Vec::new();
        while let Some(v) = even.recv().await {
            evens.push(v);
        }
        let mut odds = Vec::new();
        while let Some(v) = odd.recv().await {
            odds.push(v);
        }
        assert_eq!(evens, vec![0, 2, 4]);
        assert_eq!(odds, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_switch_unresolved_address_is_fatal() {
        let ctx = Context::new("test");
        let known = output("known");
        let mut switch = Switch::new(|_, _: &u32| Ok(Some(Address::new("nowhere"))));
        switch.out_to(vec![known.inlet()]);
        let input = attach_sink(&mut switch, 1);
        switch.flow(&ctx, FlowOptions::new());

        input.send(1).await.unwrap();
        let result = timeout(Duration::from_secs(1), ctx.wait()).await.unwrap();
        assert_eq!(result, Err(FlowError::unresolved("nowhere")));
    }

    #[tokio::test]
    async fn test_batch_switch_splits_input() {
        let ctx = Context::new("test");
        let (a, b) = (output("a"), output("b"));
        let mut switch = BatchSwitch::new(|_, v: u32, batch: &mut HashMap<Address, u32>| {
            batch.insert(Address::new("a"), v);
            if v > 1 {
                batch.insert(Address::new("b"), v * 100);
            }
            Ok(())
        });
        switch.out_to(vec![a.inlet(), b.inlet()]);
        let input = attach_sink(&mut switch, 4);
        switch.flow(&ctx, FlowOptions::new().close_output_inlets_on_exit());

        input.send(1).await.unwrap();
        input.send(2).await.unwrap();
        input.close();
        assert_eq!(ctx.wait().await, Ok(()));

        assert_eq!(a.outlet().recv().await, Some(1));
        assert_eq!(a.outlet().recv().await, Some(2));
        assert_eq!(b.outlet().recv().await, Some(200));
        assert_eq!(b.outlet().recv().await, None);
    }
}
