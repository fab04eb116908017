//! Composite segment - a pipeline exposed as one segment

use std::fmt;

use contracts::{Address, FlowError, PipelineError};
use streams::{Flow, FlowOptions, Inlet, Outlet, Sink, Source};
use supervisor::Context;
use tracing::{error, warn};

use crate::pipeline::Pipeline;

/// A [`Pipeline`] with designated boundary routes
///
/// Outlets bound through [`Sink::in_from`] are handed to every inlet target;
/// inlets bound through [`Source::out_to`] are handed to every outlet source.
pub struct Segment<I, O> {
    pipeline: Pipeline,
    inlet_targets: Vec<Address>,
    outlet_sources: Vec<Address>,
    outlets: Vec<Outlet<I>>,
    inlets: Vec<Inlet<O>>,
}

impl<I: Send + 'static, O: Send + 'static> Segment<I, O> {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            inlet_targets: Vec::new(),
            outlet_sources: Vec::new(),
            outlets: Vec::new(),
            inlets: Vec::new(),
        }
    }

    /// Mutable access to the wrapped pipeline for further routing
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Designate the internal sinks that receive this segment's input
    pub fn route_inlet_to<A: Into<Address>>(
        &mut self,
        targets: impl IntoIterator<Item = A>,
    ) -> Result<(), PipelineError> {
        let targets: Vec<Address> = targets.into_iter().map(Into::into).collect();
        for target in &targets {
            self.pipeline.sink_mut::<I>(target)?;
        }
        self.inlet_targets.extend(targets);
        Ok(())
    }

    /// Designate the internal sources that produce this segment's output
    pub fn route_outlet_from<A: Into<Address>>(
        &mut self,
        sources: impl IntoIterator<Item = A>,
    ) -> Result<(), PipelineError> {
        let sources: Vec<Address> = sources.into_iter().map(Into::into).collect();
        for source in &sources {
            self.pipeline.source_mut::<O>(source)?;
        }
        self.outlet_sources.extend(sources);
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if a target is missing or has the wrong input type.
    pub fn must_route_inlet_to<A: Into<Address>>(&mut self, targets: impl IntoIterator<Item = A>) {
        if let Err(err) = self.route_inlet_to(targets) {
            panic!("failed to route segment inlet: {err}");
        }
    }

    /// # Panics
    ///
    /// Panics if a source is missing or has the wrong output type.
    pub fn must_route_outlet_from<A: Into<Address>>(&mut self, sources: impl IntoIterator<Item = A>) {
        if let Err(err) = self.route_outlet_from(sources) {
            panic!("failed to route segment outlet: {err}");
        }
    }

    /// Bind the boundary streams into the routed internal segments
    fn bind(&mut self) -> Result<(), PipelineError> {
        if !self.outlets.is_empty() {
            if self.inlet_targets.is_empty() {
                warn!("segment input bound without inlet targets");
            }
            for target in &self.inlet_targets {
                self.pipeline.sink_mut::<I>(target)?.in_from(self.outlets.clone());
            }
        }

        if !self.inlets.is_empty() {
            if self.outlet_sources.is_empty() {
                warn!("segment output bound without outlet sources");
            }
            // The binder holds one closer per inlet; every further internal
            // source needs its own
            let extra = self.outlet_sources.len().saturating_sub(1) as i64;
            for inlet in &self.inlets {
                inlet.acquire(extra);
            }
            for source in &self.outlet_sources {
                self.pipeline.source_mut::<O>(source)?.out_to(self.inlets.clone());
            }
        }
        Ok(())
    }
}

impl<I: Send + 'static, O: Send + 'static> Sink for Segment<I, O> {
    type In = I;

    fn in_from(&mut self, outlets: Vec<Outlet<I>>) {
        self.outlets.extend(outlets);
    }
}

impl<I: Send + 'static, O: Send + 'static> Source for Segment<I, O> {
    type Out = O;

    fn out_to(&mut self, inlets: Vec<Inlet<O>>) {
        self.inlets.extend(inlets);
    }
}

impl<I: Send + 'static, O: Send + 'static> Flow for Segment<I, O> {
    fn flow(mut self, ctx: &Context, opts: FlowOptions) {
        if let Err(err) = self.bind() {
            let key = opts.key_or("segment");
            error!(segment = %key, error = %err, "failed to bind segment routes");
            ctx.fail(FlowError::task(key, err.to_string()));
            ctx.cancel();
            return;
        }
        // Entity keys inside the pipeline are their own addresses
        let mut inner = opts;
        inner.key = None;
        self.pipeline.flow(ctx, inner);
    }
}

impl<I, O> fmt::Debug for Segment<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("pipeline", &self.pipeline)
            .field("inlet_targets", &self.inlet_targets)
            .field("outlet_sources", &self.outlet_sources)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::must_connect;
    use std::time::Duration;
    use streams::{attach, Transform};
    use tokio::time::timeout;

    fn chain() -> Segment<u32, u32> {
        let mut p = Pipeline::new();
        p.set_segment("double", Transform::linear(|v: u32| v * 2), FlowOptions::new());
        p.set_segment("inc", Transform::linear(|v: u32| v + 1), FlowOptions::new());
        must_connect::<u32>(&mut p, "double", "inc", 1);
        Segment::new(p)
    }

    #[tokio::test]
    async fn test_composite_behaves_as_one_segment() {
        let ctx = Context::new("test");
        let mut segment = chain();
        segment.route_inlet_to(["double"]).unwrap();
        segment.route_outlet_from(["inc"]).unwrap();
        let (input, output) = attach(&mut segment, 2);
        segment.flow(&ctx, FlowOptions::new().close_output_inlets_on_exit());

        input.send(1).await.unwrap();
        input.send(5).await.unwrap();
        input.close();
        assert_eq!(output.recv().await, Some(3));
        assert_eq!(output.recv().await, Some(11));
        assert_eq!(output.recv().await, None);
        assert_eq!(timeout(Duration::from_secs(1), ctx.wait()).await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_boundary_closes_after_every_internal_source() {
        let ctx = Context::new("test");
        let mut p = Pipeline::new();
        p.set_segment("left", Transform::linear(|v: u32| v), FlowOptions::new());
        p.set_segment("right", Transform::linear(|v: u32| v + 100), FlowOptions::new());
        let mut segment = Segment::<u32, u32>::new(p);
        segment.route_inlet_to(["left", "right"]).unwrap();
        segment.route_outlet_from(["left", "right"]).unwrap();
        let (input, output) = attach(&mut segment, 8);
        segment.flow(&ctx, FlowOptions::new().close_output_inlets_on_exit());

        for v in 0..4 {
            input.send(v).await.unwrap();
        }
        input.close();

        let mut received = Vec::new();
        while let Some(v) = timeout(Duration::from_secs(1), output.recv()).await.unwrap() {
            received.push(v % 100);
        }
        received.sort_unstable();
        assert_eq!(received, vec![0, 1, 2, 3]);
        assert_eq!(ctx.wait().await, Ok(()));
    }

    #[test]
    fn test_route_validation_at_call_time() {
        let mut segment = chain();
        assert!(matches!(
            segment.route_inlet_to(["missing"]),
            Err(PipelineError::AddressNotFound { .. })
        ));
        let mut wrong = Segment::<String, u32>::new(Pipeline::new());
        assert!(wrong.route_outlet_from(["double"]).is_err());
        assert!(segment.route_outlet_from(["inc"]).is_ok());
    }
}
