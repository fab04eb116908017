//! DynamicDeltaMultiplier - broadcast to a live, changing set of subscribers
//!
//! Subscribers join and leave through two command queues consumed by the
//! segment's own event loop, so the subscriber list is never shared between
//! tasks. With a timeout configured, a subscriber that cannot accept a value
//! in time misses that value; the broadcast carries on to the others.
//!
//! Connected subscribers survive a panic restart of the loop. Once the
//! multiplier exits for good, every subscriber it accepted is closed,
//! including batches still queued on the command channels.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_channel::{unbounded, Receiver, Sender};
use contracts::{Address, FlowError, MultiplierConfig};
use streams::{Flow, FlowOptions, Inlet, Outlet, Sink, Source, UnarySink};
use supervisor::Context;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, instrument, warn};

use crate::metrics::MultiplierMetrics;

/// Subscribe and unsubscribe handle for a running multiplier
pub struct MultiplierHandle<V> {
    connections: Sender<Vec<Inlet<V>>>,
    disconnections: Sender<Vec<Inlet<V>>>,
    metrics: Arc<MultiplierMetrics>,
}

impl<V> Clone for MultiplierHandle<V> {
    fn clone(&self) -> Self {
        Self {
            connections: self.connections.clone(),
            disconnections: self.disconnections.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<V: Send + 'static> MultiplierHandle<V> {
    /// Connect subscribers
    ///
    /// Each inlet gets one closer acquired on connect and released on
    /// disconnect or when the multiplier exits.
    pub async fn connect(&self, inlets: Vec<Inlet<V>>) -> Result<(), FlowError> {
        self.connections
            .send(inlets)
            .await
            .map_err(|_| FlowError::other("multiplier is no longer running"))
    }

    /// Disconnect subscribers and close their inlets
    pub async fn disconnect(&self, inlets: Vec<Inlet<V>>) -> Result<(), FlowError> {
        self.disconnections
            .send(inlets)
            .await
            .map_err(|_| FlowError::other("multiplier is no longer running"))
    }

    pub fn metrics(&self) -> &Arc<MultiplierMetrics> {
        &self.metrics
    }
}

/// Broadcast segment with runtime subscriber changes and slow-consumer timeout
pub struct DynamicDeltaMultiplier<V> {
    sink: UnarySink<V>,
    initial: Vec<Inlet<V>>,
    timeout: Option<Duration>,
    connections: (Sender<Vec<Inlet<V>>>, Receiver<Vec<Inlet<V>>>),
    disconnections: (Sender<Vec<Inlet<V>>>, Receiver<Vec<Inlet<V>>>),
    metrics: Arc<MultiplierMetrics>,
}

impl<V: Clone + Send + 'static> DynamicDeltaMultiplier<V> {
    /// Create a multiplier; `None` waits on every subscriber indefinitely
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            sink: UnarySink::new(),
            initial: Vec::new(),
            timeout,
            connections: unbounded(),
            disconnections: unbounded(),
            metrics: Arc::new(MultiplierMetrics::new()),
        }
    }

    pub fn from_config(config: &MultiplierConfig) -> Self {
        Self::new(config.timeout())
    }

    /// Handle for connecting and disconnecting subscribers
    pub fn handle(&self) -> MultiplierHandle<V> {
        MultiplierHandle {
            connections: self.connections.0.clone(),
            disconnections: self.disconnections.0.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub fn metrics(&self) -> &Arc<MultiplierMetrics> {
        &self.metrics
    }
}

impl<V: Clone + Send + 'static> Sink for DynamicDeltaMultiplier<V> {
    type In = V;

    fn in_from(&mut self, outlets: Vec<Outlet<V>>) {
        self.sink.in_from(outlets);
    }
}

impl<V: Clone + Send + 'static> Source for DynamicDeltaMultiplier<V> {
    type Out = V;

    /// Inlets bound here are connected from the start; their closers are
    /// owned by whoever bound them
    fn out_to(&mut self, inlets: Vec<Inlet<V>>) {
        self.initial.extend(inlets);
    }
}

impl<V: Clone + Send + 'static> Flow for DynamicDeltaMultiplier<V> {
    fn flow(self, ctx: &Context, opts: FlowOptions) {
        let key = opts.key_or("multiplier");
        let outlet = self.sink.bound(&key);
        let commands = Commands {
            connections: self.connections.1,
            disconnections: self.disconnections.1,
        };
        let parked = Arc::new(Mutex::new(self.initial));
        let (timeout, metrics) = (self.timeout, self.metrics);

        let go = {
            let (key, commands, parked, metrics) =
                (key.clone(), commands.clone(), Arc::clone(&parked), Arc::clone(&metrics));
            opts.go_options(&key, ()).defer(move || {
                commands.shut(&key);
                let leftover: Vec<_> = lock(&parked).drain(..).collect();
                if !leftover.is_empty() {
                    debug!(segment = %key, count = leftover.len(), "closing subscribers left by a failed loop");
                    for inlet in leftover {
                        inlet.close();
                    }
                    metrics.set_subscribers(0);
                    observability::record_subscriber_count(&key, 0);
                }
                Ok(())
            })
        };

        ctx.go(
            move |ctx| {
                let subscribers = Subscribers {
                    key: key.clone(),
                    inlets: lock(&parked).drain(..).collect(),
                    metrics: Arc::clone(&metrics),
                    parked: Arc::clone(&parked),
                };
                run(ctx, subscribers, outlet.clone(), commands.clone(), timeout)
            },
            go,
        );
    }
}

fn lock<V>(parked: &Mutex<Vec<Inlet<V>>>) -> MutexGuard<'_, Vec<Inlet<V>>> {
    parked.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Receiving ends of the subscribe and unsubscribe queues
struct Commands<V> {
    connections: Receiver<Vec<Inlet<V>>>,
    disconnections: Receiver<Vec<Inlet<V>>>,
}

impl<V> Clone for Commands<V> {
    fn clone(&self) -> Self {
        Self {
            connections: self.connections.clone(),
            disconnections: self.disconnections.clone(),
        }
    }
}

impl<V: Send + 'static> Commands<V> {
    /// Refuse further commands and close subscribers that were queued but
    /// never served
    ///
    /// A queued inlet is acquired and released once, as if it had been
    /// connected and the multiplier had then exited.
    fn shut(&self, key: &str) {
        self.connections.close();
        self.disconnections.close();

        let mut refused = 0usize;
        while let Ok(batch) = self.connections.try_recv() {
            for inlet in batch {
                inlet.acquire(1);
                inlet.close();
                refused += 1;
            }
        }
        while self.disconnections.try_recv().is_ok() {}

        if refused > 0 {
            warn!(segment = %key, refused, "multiplier exited before serving queued subscribers, closed them");
        }
    }
}

#[instrument(
    name = "multiplier_loop",
    skip_all,
    fields(segment = %subscribers.key, timeout_ms = ?timeout.map(|t| t.as_millis()))
)]
async fn run<V: Clone + Send + 'static>(
    ctx: Context,
    mut subscribers: Subscribers<V>,
    outlet: Outlet<V>,
    commands: Commands<V>,
    timeout: Option<Duration>,
) -> Result<(), FlowError> {
    debug!(subscribers = subscribers.inlets.len(), "multiplier started");
    subscribers.publish_count();

    let result = loop {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => break Err(FlowError::Cancelled),
            Ok(batch) = commands.connections.recv() => subscribers.connect(batch),
            Ok(batch) = commands.disconnections.recv() => subscribers.disconnect(batch),
            value = outlet.recv() => match value {
                Some(value) => {
                    let sent = match timeout {
                        Some(timeout) => subscribers.broadcast_within(&ctx, value, timeout).await,
                        None => subscribers.broadcast(&ctx, value).await,
                    };
                    if let Err(err) = sent {
                        break Err(err);
                    }
                }
                None => break Ok(()),
            },
        }
    };

    subscribers.close_all();
    commands.shut(&subscribers.key);
    result
}

/// Subscriber list owned by the event loop
///
/// Inlets still held when the list is dropped mid-loop (a panic) are parked
/// for the next attempt.
struct Subscribers<V> {
    key: String,
    inlets: Vec<Inlet<V>>,
    metrics: Arc<MultiplierMetrics>,
    parked: Arc<Mutex<Vec<Inlet<V>>>>,
}

impl<V> Drop for Subscribers<V> {
    fn drop(&mut self) {
        if !self.inlets.is_empty() {
            lock(&self.parked).extend(self.inlets.drain(..));
        }
    }
}

impl<V: Clone + Send + 'static> Subscribers<V> {
    fn position(&self, inlet: &Inlet<V>) -> Option<usize> {
        self.inlets.iter().position(|i| i.same_stream(inlet))
    }

    fn connect(&mut self, batch: Vec<Inlet<V>>) {
        for inlet in batch {
            if self.position(&inlet).is_some() {
                error!(
                    segment = %self.key,
                    subscriber = %inlet.address(),
                    "subscriber already connected, ignoring"
                );
                continue;
            }
            inlet.acquire(1);
            debug!(segment = %self.key, subscriber = %inlet.address(), "subscriber connected");
            self.inlets.push(inlet);
        }
        self.publish_count();
    }

    fn disconnect(&mut self, batch: Vec<Inlet<V>>) {
        for inlet in batch {
            match self.position(&inlet) {
                Some(index) => {
                    let removed = self.inlets.remove(index);
                    removed.close();
                    debug!(segment = %self.key, subscriber = %removed.address(), "subscriber disconnected");
                }
                None => error!(
                    segment = %self.key,
                    subscriber = %inlet.address(),
                    "disconnecting subscriber that is not connected"
                ),
            }
        }
        self.publish_count();
    }

    /// Send to every subscriber, waiting on each as long as it takes
    async fn broadcast(&self, ctx: &Context, value: V) -> Result<(), FlowError> {
        self.metrics.inc_round_count();
        for inlet in &self.inlets {
            match inlet.send_or_cancel(ctx, value.clone()).await {
                Ok(()) => self.metrics.inc_delivered_count(),
                Err(FlowError::Cancelled) => return Err(FlowError::Cancelled),
                Err(_) => self.closed(inlet.address()),
            }
        }
        observability::record_multiplier_round(&self.key, self.inlets.len(), 0);
        Ok(())
    }

    /// Send to every subscriber under one shared timer
    ///
    /// The timer is re-armed only when it fires, so one round costs at most
    /// one timeout per slow subscriber.
    async fn broadcast_within(&self, ctx: &Context, value: V, timeout: Duration) -> Result<(), FlowError> {
        self.metrics.inc_round_count();
        let timer = sleep(timeout);
        tokio::pin!(timer);

        let mut timed_out: Vec<&Address> = Vec::new();
        for inlet in &self.inlets {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(FlowError::Cancelled),
                sent = inlet.send(value.clone()) => match sent {
                    Ok(()) => self.metrics.inc_delivered_count(),
                    Err(_) => self.closed(inlet.address()),
                },
                _ = &mut timer => {
                    timed_out.push(inlet.address());
                    timer.as_mut().reset(Instant::now() + timeout);
                }
            }
        }

        if !timed_out.is_empty() {
            self.metrics.add_timeout_count(timed_out.len() as u64);
            for address in &timed_out {
                warn!(
                    segment = %self.key,
                    subscriber = %address,
                    timeout_ms = timeout.as_millis() as u64,
                    "subscriber timed out, value dropped"
                );
                observability::record_subscriber_timeout(&self.key, address.as_str());
            }
        }
        observability::record_multiplier_round(&self.key, self.inlets.len(), timed_out.len());
        Ok(())
    }

    fn closed(&self, address: &Address) {
        self.metrics.inc_closed_count();
        warn!(segment = %self.key, subscriber = %address, "subscriber stream closed, value dropped");
    }

    fn publish_count(&self) {
        self.metrics.set_subscribers(self.inlets.len());
        observability::record_subscriber_count(&self.key, self.inlets.len());
    }

    fn close_all(&mut self) {
        for inlet in self.inlets.drain(..) {
            inlet.close();
        }
        self.publish_count();
        debug!(segment = %self.key, "multiplier closed all subscribers");
    }
}
