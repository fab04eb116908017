//! Stream - addressable, reference-counted, closeable bounded queue

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use contracts::{Address, FlowError};
use supervisor::Context;
use tracing::trace;

/// State shared by every half of one stream
///
/// Both channel ends live here, so the queue is only ever closed explicitly
/// through [`Inlet::close`], never by dropping handles.
struct Shared<V> {
    tx: Sender<V>,
    rx: Receiver<V>,
    /// Pending closers; the queue closes when this drops to zero or below
    pending: AtomicI64,
    capacity: usize,
}

impl<V> Shared<V> {
    fn acquire(&self, n: i64) {
        self.pending.fetch_add(n, Ordering::AcqRel);
    }

    fn release(&self, address: &Address) {
        let remaining = self.pending.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining <= 0 && self.tx.close() {
            trace!(address = %address, "stream closed");
        }
    }
}

/// Bounded FIFO queue with an addressable inlet (send) and outlet (receive) half
pub struct Stream<V> {
    shared: Arc<Shared<V>>,
    inlet_address: Address,
    outlet_address: Address,
}

impl<V: Send + 'static> Stream<V> {
    /// Create a new stream
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            shared: Arc::new(Shared {
                tx,
                rx,
                pending: AtomicI64::new(0),
                capacity,
            }),
            inlet_address: Address::default(),
            outlet_address: Address::default(),
        }
    }

    /// Set the address reported by inlets handed out afterwards
    pub fn set_inlet_address(&mut self, address: impl Into<Address>) {
        self.inlet_address = address.into();
    }

    /// Set the address reported by outlets handed out afterwards
    pub fn set_outlet_address(&mut self, address: impl Into<Address>) {
        self.outlet_address = address.into();
    }

    /// Builder form of [`Stream::set_inlet_address`]
    pub fn with_inlet_address(mut self, address: impl Into<Address>) -> Self {
        self.set_inlet_address(address);
        self
    }

    /// Builder form of [`Stream::set_outlet_address`]
    pub fn with_outlet_address(mut self, address: impl Into<Address>) -> Self {
        self.set_outlet_address(address);
        self
    }

    /// Send half
    pub fn inlet(&self) -> Inlet<V> {
        Inlet {
            shared: Arc::clone(&self.shared),
            address: self.inlet_address.clone(),
        }
    }

    /// Receive half
    pub fn outlet(&self) -> Outlet<V> {
        Outlet {
            shared: Arc::clone(&self.shared),
            address: self.outlet_address.clone(),
        }
    }

    /// Register `n` additional closers
    pub fn acquire(&self, n: i64) {
        self.shared.acquire(n);
    }

    /// Release one closer
    pub fn close(&self) {
        self.shared.release(&self.inlet_address);
    }

    /// Check if the underlying queue is closed
    pub fn is_closed(&self) -> bool {
        self.shared.tx.is_closed()
    }

    /// Number of buffered values
    pub fn len(&self) -> usize {
        self.shared.rx.len()
    }

    /// Check if no values are buffered
    pub fn is_empty(&self) -> bool {
        self.shared.rx.is_empty()
    }

    /// Queue capacity
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl<V> fmt::Debug for Stream<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("inlet_address", &self.inlet_address)
            .field("outlet_address", &self.outlet_address)
            .field("capacity", &self.shared.capacity)
            .field("closed", &self.shared.tx.is_closed())
            .finish()
    }
}

/// Send half of a stream
pub struct Inlet<V> {
    shared: Arc<Shared<V>>,
    address: Address,
}

impl<V> Clone for Inlet<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            address: self.address.clone(),
        }
    }
}

impl<V: Send + 'static> Inlet<V> {
    /// Inlet address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Register `n` additional closers on the underlying stream
    pub fn acquire(&self, n: i64) {
        self.shared.acquire(n);
    }

    /// Release one closer; the last release closes the queue
    pub fn close(&self) {
        self.shared.release(&self.address);
    }

    /// Check if the underlying queue is closed
    pub fn is_closed(&self) -> bool {
        self.shared.tx.is_closed()
    }

    /// True if both inlets feed the same stream
    pub fn same_stream(&self, other: &Inlet<V>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Send, waiting for capacity
    pub async fn send(&self, value: V) -> Result<(), FlowError> {
        self.shared
            .tx
            .send(value)
            .await
            .map_err(|_| FlowError::stream_closed(self.address.clone()))
    }

    /// Send, waiting for capacity or cancellation of `ctx`
    pub async fn send_or_cancel(&self, ctx: &Context, value: V) -> Result<(), FlowError> {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(FlowError::Cancelled),
            result = self.send(value) => result,
        }
    }

    /// Send without waiting
    ///
    /// Returns the value back when the queue is full.
    pub fn try_send(&self, value: V) -> Result<(), TrySendError<V>> {
        self.shared.tx.try_send(value)
    }
}

impl<V> fmt::Debug for Inlet<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inlet")
            .field("address", &self.address)
            .finish()
    }
}

/// Receive half of a stream
pub struct Outlet<V> {
    shared: Arc<Shared<V>>,
    address: Address,
}

impl<V> Clone for Outlet<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            address: self.address.clone(),
        }
    }
}

impl<V: Send + 'static> Outlet<V> {
    /// Outlet address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Receive the next value, `None` once the stream is closed and drained
    pub async fn recv(&self) -> Option<V> {
        self.shared.rx.recv().await.ok()
    }

    /// Receive, racing cancellation of `ctx`
    pub async fn recv_or_cancel(&self, ctx: &Context) -> Result<Option<V>, FlowError> {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(FlowError::Cancelled),
            value = self.recv() => Ok(value),
        }
    }

    /// Receive without waiting
    pub fn try_recv(&self) -> Result<V, TryRecvError> {
        self.shared.rx.try_recv()
    }

    /// Number of buffered values
    pub fn len(&self) -> usize {
        self.shared.rx.len()
    }

    /// Check if no values are buffered
    pub fn is_empty(&self) -> bool {
        self.shared.rx.is_empty()
    }

    /// Check if the underlying queue is closed
    pub fn is_closed(&self) -> bool {
        self.shared.rx.is_closed()
    }
}

impl<V> fmt::Debug for Outlet<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outlet")
            .field("address", &self.address)
            .finish()
    }
}
