//! Emitter - timer-driven source

use std::sync::Arc;
use std::time::Duration;

use contracts::FlowError;
use supervisor::Context;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::base::UnarySource;
use crate::options::FlowOptions;
use crate::segment::{Flow, Source};
use crate::stream::Inlet;

/// Emit function, called with the zero-based tick number
///
/// `Ok(None)` ends the emitter; `Err` ends it with that failure.
pub type EmitFn<V> = Arc<dyn Fn(&Context, u64) -> Result<Option<V>, FlowError> + Send + Sync>;

/// Emits one value per interval until cancelled or exhausted
pub struct Emitter<V> {
    source: UnarySource<V>,
    interval: Duration,
    func: EmitFn<V>,
}

impl<V: Send + 'static> Emitter<V> {
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn new(
        interval: Duration,
        func: impl Fn(&Context, u64) -> Result<Option<V>, FlowError> + Send + Sync + 'static,
    ) -> Self {
        assert!(!interval.is_zero(), "emitter interval must be positive");
        Self {
            source: UnarySource::new(),
            interval,
            func: Arc::new(func),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl<V: Send + 'static> Source for Emitter<V> {
    type Out = V;

    fn out_to(&mut self, inlets: Vec<Inlet<V>>) {
        self.source.out_to(inlets);
    }
}

impl<V: Send + 'static> Flow for Emitter<V> {
    fn flow(self, ctx: &Context, opts: FlowOptions) {
        let key = opts.key_or("emitter");
        let inlet = self.source.bound(&key);
        let (interval, func) = (self.interval, self.func);
        let go = opts.go_options(&key, inlet.clone());
        ctx.go(
            move |ctx| {
                let (inlet, func, key) = (inlet.clone(), func.clone(), key.clone());
                async move {
                    let mut ticker = tokio::time::interval(interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    let mut tick = 0u64;
                    loop {
                        tokio::select! {
                            biased;
                            _ = ctx.cancelled() => return Err(FlowError::Cancelled),
                            _ = ticker.tick() => {}
                        }
                        match func(&ctx, tick)? {
                            Some(value) => inlet.send_or_cancel(&ctx, value).await?,
                            None => {
                                debug!(segment = %key, ticks = tick, "emitter exhausted");
                                return Ok(());
                            }
                        }
                        tick += 1;
                    }
                }
            },
            go,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach::attach_source;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_emitter_emits_until_exhausted() {
        let ctx = Context::new("test");
        let mut emitter = Emitter::new(Duration::from_millis(1), |_, tick| {
            Ok((tick < 3).then_some(tick * 2))
        });
        let output = attach_source(&mut emitter, 4);
        emitter.flow(&ctx, FlowOptions::new().close_output_inlets_on_exit());

        let mut received = Vec::new();
        while let Some(v) = timeout(Duration::from_secs(1), output.recv()).await.unwrap() {
            received.push(v);
        }
        assert_eq!(received, vec![0, 2, 4]);
        assert_eq!(ctx.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn test_emitter_stops_on_cancel() {
        let ctx = Context::new("test");
        let mut emitter = Emitter::new(Duration::from_millis(1), |_, tick| Ok(Some(tick)));
        let output = attach_source(&mut emitter, 1);
        emitter.flow(&ctx, FlowOptions::new().close_output_inlets_on_exit());

        assert_eq!(output.recv().await, Some(0));
        timeout(Duration::from_secs(1), ctx.shutdown()).await.unwrap().unwrap();
        assert!(output.is_closed());
    }
}
