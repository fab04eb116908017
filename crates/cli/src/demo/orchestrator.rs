//! Demo orchestrator - coordinates all components.
//!
//! ```text
//! ticker ──> stamp ──> fanout ──┬──> node-1 ──┐
//!                               ├──> node-2 ──┼──> barrier ──> collector
//!                               └──> node-N ──┘
//! ```
//!
//! `fanout` is a dynamic broadcast with an optional per-round timeout. Once
//! the ticker is exhausted every node commits what it saw, and the barrier
//! merges the commits into one release: authorized only if no node lost a
//! frame, with the furthest sequence number reached as commit point.

use std::future::{pending, Future};
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::EngineConfig;
use dispatcher::DynamicDeltaMultiplier;
use observability::FlowMetricsAggregator;
use pipeline::{connect, Pipeline};
use streams::{attach, Emitter, Flow, FlowOptions, Inlet, Outlet, Stream, Transform};
use supervisor::{Context, GoOptions};
use sync_engine::{Acknowledgement, NodeKey, Synchronizer, TimeStamp, WriterResponse};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::DemoStats;
use crate::error::{CliError, Result};

/// Sequence number of the final commit cycle
const COMMIT_SEQ: u64 = 1;

/// Stamped ticker value broadcast to every node
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    pub emitted_at: Instant,
}

/// Demo configuration
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Engine configuration (streams, supervision, multiplier, barrier)
    pub engine: EngineConfig,

    /// Number of frames to emit
    pub ticks: u64,

    /// Ticker interval (must be positive)
    pub interval: Duration,

    /// Processing delay of the last node (None = as fast as the others)
    pub slow_delay: Option<Duration>,

    /// Run deadline (None = no deadline)
    pub deadline: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Demo orchestrator
pub struct Demo {
    config: DemoConfig,
}

impl Demo {
    pub fn new(config: DemoConfig) -> Self {
        Self { config }
    }

    /// Run the topology until the ticker is exhausted and every stage drained,
    /// or until `shutdown` resolves
    ///
    /// Stopping cancels the topology and waits for every task before
    /// returning [`CliError::Interrupted`].
    #[instrument(
        name = "demo_run",
        skip(self, shutdown),
        fields(
            ticks = self.config.ticks,
            nodes = self.config.engine.barrier.node_count,
            timeout_ms = self.config.engine.multiplier.timeout_ms
        )
    )]
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<DemoStats> {
        let start_time = Instant::now();

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let engine = &self.config.engine;
        let nodes = engine.barrier.node_count.max(1);
        let capacity = engine.streams.default_capacity;
        let ctx = Context::new("flowctl");
        let opts = FlowOptions::from(&engine.supervision).close_output_inlets_on_exit();
        let aggregator = Arc::new(Mutex::new(FlowMetricsAggregator::new()));

        // Barrier: every node writes into one response stream
        let mut barrier = Synchronizer::<WriterResponse>::from_config(&engine.barrier);
        let (responses, released) = attach(&mut barrier, capacity.saturating_mul(nodes));
        responses.acquire(nodes as i64);
        barrier.flow(&ctx, opts.clone().key("barrier"));

        // Main chain: ticker -> stamp -> fanout
        let ticks = self.config.ticks;
        let fanout = DynamicDeltaMultiplier::<Frame>::from_config(&engine.multiplier);
        let handle = fanout.handle();
        let multiplier_metrics = Arc::clone(fanout.metrics());

        let mut topology = Pipeline::new();
        topology.set_source(
            "ticker",
            Emitter::new(self.config.interval, move |_, tick| {
                Ok((tick < ticks).then_some(tick + 1))
            }),
            FlowOptions::new(),
        );
        topology.set_segment(
            "stamp",
            Transform::linear(|seq: u64| Frame {
                seq,
                emitted_at: Instant::now(),
            }),
            FlowOptions::new(),
        );
        topology.set_sink("fanout", fanout, FlowOptions::new());
        connect::<u64>(&mut topology, "ticker", "stamp", capacity)?;
        connect::<Frame>(&mut topology, "stamp", "fanout", capacity)?;

        // Subscribers connect before the first frame is emitted
        for node in 1..=nodes {
            let stream = Stream::<Frame>::new(capacity).with_inlet_address(format!("node-{node}"));
            handle.connect(vec![stream.inlet()]).await?;
            let delay = if node == nodes { self.config.slow_delay } else { None };
            spawn_node(
                &ctx,
                node as NodeKey,
                stream.outlet(),
                responses.clone(),
                ticks,
                delay,
                Arc::clone(&aggregator),
            );
        }

        info!(nodes, capacity, "Topology wired, starting");
        topology.flow(&ctx, opts);

        let finished = async {
            let commit = collect_releases(released, &aggregator).await;
            ctx.wait().await.map(|()| commit)
        };
        let deadline = async {
            match self.config.deadline {
                Some(deadline) => {
                    tokio::time::sleep(deadline).await;
                    deadline
                }
                None => pending().await,
            }
        };
        let commit = tokio::select! {
            result = finished => result?,
            deadline = deadline => {
                warn!(deadline_secs = deadline.as_secs(), "Deadline reached, shutting down");
                stop(&ctx).await;
                return Err(CliError::DeadlineExceeded {
                    secs: deadline.as_secs(),
                });
            }
            () = shutdown => {
                warn!("Shutdown requested, stopping topology");
                stop(&ctx).await;
                return Err(CliError::Interrupted);
            }
        };

        let snapshot = multiplier_metrics.snapshot();
        let mut flow = aggregator.lock().await.clone();
        flow.total_rounds = snapshot.round_count;
        flow.total_deliveries = snapshot.delivered_count;
        flow.total_timeouts = snapshot.timeout_count;

        Ok(DemoStats {
            ticks,
            nodes,
            duration: start_time.elapsed(),
            multiplier: snapshot,
            flow,
            commit,
        })
    }
}

/// Cancel every task and wait for them to exit
async fn stop(ctx: &Context) {
    if let Err(err) = ctx.shutdown().await {
        warn!(error = %err, "Task failed during shutdown");
    }
}

/// Spawn one subscriber node
///
/// The node consumes frames until its stream closes, then commits the last
/// sequence number it saw. The commit is authorized only if all `ticks`
/// frames arrived.
fn spawn_node(
    ctx: &Context,
    node: NodeKey,
    frames: Outlet<Frame>,
    responses: Inlet<WriterResponse>,
    ticks: u64,
    delay: Option<Duration>,
    aggregator: Arc<Mutex<FlowMetricsAggregator>>,
) {
    let closer = responses.clone();
    ctx.go(
        move |ctx| {
            let (frames, responses, aggregator) =
                (frames.clone(), responses.clone(), Arc::clone(&aggregator));
            async move {
                let (mut received, mut last) = (0u64, 0u64);
                while let Some(frame) = frames.recv_or_cancel(&ctx).await? {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    let latency_ms = frame.emitted_at.elapsed().as_secs_f64() * 1000.0;
                    observability::record_delivery_latency_ms(latency_ms);
                    aggregator.lock().await.update_latency(latency_ms);
                    received += 1;
                    last = frame.seq;
                }

                debug!(node, received, last, "node drained, committing");
                let response = WriterResponse::new(COMMIT_SEQ, node, received == ticks)
                    .with_end(last as TimeStamp);
                responses.send_or_cancel(&ctx, response).await
            }
        },
        GoOptions::new()
            .key(format!("node-{node}"))
            .cancel_on_fail()
            .defer(move || {
                closer.close();
                Ok(())
            }),
    );
}

/// Drain the barrier's output until it closes, returning the last release
async fn collect_releases(
    released: Outlet<WriterResponse>,
    aggregator: &Mutex<FlowMetricsAggregator>,
) -> Option<WriterResponse> {
    let mut last = None;
    while let Some(response) = released.recv().await {
        debug!(seq_num = response.seq_num(), acked = response.acked(), "cycle released");
        aggregator.lock().await.update_release(response.acked());
        last = Some(response);
    }
    last
}
