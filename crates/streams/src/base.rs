//! Reusable sink and source parts
//!
//! Segments embed these to get the binding half of [`Sink`](crate::Sink) or
//! [`Source`](crate::Source) without repeating the arity checks.

use std::collections::HashMap;

use contracts::{Address, FlowError};
use supervisor::Context;
use tracing::warn;

use crate::stream::{Inlet, Outlet};

/// Exactly one input outlet
#[derive(Debug)]
pub struct UnarySink<I> {
    outlet: Option<Outlet<I>>,
}

impl<I> Default for UnarySink<I> {
    fn default() -> Self {
        Self { outlet: None }
    }
}

impl<I: Send + 'static> UnarySink<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the single input
    ///
    /// # Panics
    ///
    /// Panics unless `outlets` holds exactly one outlet.
    pub fn in_from(&mut self, mut outlets: Vec<Outlet<I>>) {
        assert_eq!(
            outlets.len(),
            1,
            "unary sink accepts exactly one outlet, got {}",
            outlets.len()
        );
        self.outlet = outlets.pop();
    }

    /// Bound outlet
    ///
    /// # Panics
    ///
    /// Panics if the segment `key` is started before an input was bound.
    pub fn bound(&self, key: &str) -> Outlet<I> {
        match &self.outlet {
            Some(outlet) => outlet.clone(),
            None => panic!("segment {key} started without an input outlet"),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.outlet.is_some()
    }
}

/// Exactly one output inlet
#[derive(Debug)]
pub struct UnarySource<O> {
    inlet: Option<Inlet<O>>,
}

impl<O> Default for UnarySource<O> {
    fn default() -> Self {
        Self { inlet: None }
    }
}

impl<O: Send + 'static> UnarySource<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the single output
    ///
    /// # Panics
    ///
    /// Panics unless `inlets` holds exactly one inlet.
    pub fn out_to(&mut self, mut inlets: Vec<Inlet<O>>) {
        assert_eq!(
            inlets.len(),
            1,
            "unary source accepts exactly one inlet, got {}",
            inlets.len()
        );
        self.inlet = inlets.pop();
    }

    /// Bound inlet
    ///
    /// # Panics
    ///
    /// Panics if the segment `key` is started before an output was bound.
    pub fn bound(&self, key: &str) -> Inlet<O> {
        match &self.inlet {
            Some(inlet) => inlet.clone(),
            None => panic!("segment {key} started without an output inlet"),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.inlet.is_some()
    }
}

/// Any number of outputs, every value broadcast to all of them
#[derive(Debug)]
pub struct MultiSource<O> {
    inlets: Vec<Inlet<O>>,
}

impl<O> Default for MultiSource<O> {
    fn default() -> Self {
        Self { inlets: Vec::new() }
    }
}

impl<O> Clone for MultiSource<O> {
    fn clone(&self) -> Self {
        Self {
            inlets: self.inlets.clone(),
        }
    }
}

impl<O: Send + 'static> MultiSource<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append outputs
    pub fn out_to(&mut self, inlets: Vec<Inlet<O>>) {
        self.inlets.extend(inlets);
    }

    pub fn inlets(&self) -> &[Inlet<O>] {
        &self.inlets
    }

    pub fn len(&self) -> usize {
        self.inlets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inlets.is_empty()
    }
}

impl<O: Clone + Send + 'static> MultiSource<O> {
    /// Send a copy of `value` to every output in bind order
    pub async fn send_all(&self, ctx: &Context, value: O) -> Result<(), FlowError> {
        let Some((last, rest)) = self.inlets.split_last() else {
            return Ok(());
        };
        for inlet in rest {
            inlet.send_or_cancel(ctx, value.clone()).await?;
        }
        last.send_or_cancel(ctx, value).await
    }
}

/// What an addressable source does when two inlets share an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Binding a duplicate address is a wiring bug
    #[default]
    Panic,
    /// The later inlet replaces the earlier one
    Override,
}

/// Outputs keyed by inlet address, for resolved dispatch
#[derive(Debug)]
pub struct AddressableSource<O> {
    inlets: HashMap<Address, Inlet<O>>,
    policy: DuplicatePolicy,
}

impl<O> Default for AddressableSource<O> {
    fn default() -> Self {
        Self {
            inlets: HashMap::new(),
            policy: DuplicatePolicy::default(),
        }
    }
}

impl<O> Clone for AddressableSource<O> {
    fn clone(&self) -> Self {
        Self {
            inlets: self.inlets.clone(),
            policy: self.policy,
        }
    }
}

impl<O: Send + 'static> AddressableSource<O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self {
            inlets: HashMap::new(),
            policy,
        }
    }

    /// Index `inlets` by their address
    ///
    /// # Panics
    ///
    /// Panics on a duplicate address under [`DuplicatePolicy::Panic`].
    pub fn out_to(&mut self, inlets: Vec<Inlet<O>>) {
        for inlet in inlets {
            let address = inlet.address().clone();
            if self.inlets.contains_key(&address) {
                match self.policy {
                    DuplicatePolicy::Panic => {
                        panic!("addressable source already has an inlet for {address}")
                    }
                    DuplicatePolicy::Override => {
                        warn!(address = %address, "overriding inlet with duplicate address");
                    }
                }
            }
            self.inlets.insert(address, inlet);
        }
    }

    pub fn get(&self, address: &Address) -> Option<&Inlet<O>> {
        self.inlets.get(address)
    }

    pub fn inlets(&self) -> &HashMap<Address, Inlet<O>> {
        &self.inlets
    }

    pub fn len(&self) -> usize {
        self.inlets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inlets.is_empty()
    }

    /// Send `value` to the inlet at `address`
    pub async fn send_to(&self, ctx: &Context, address: &Address, value: O) -> Result<(), FlowError> {
        match self.inlets.get(address) {
            Some(inlet) => inlet.send_or_cancel(ctx, value).await,
            None => Err(FlowError::unresolved(address.clone())),
        }
    }
}
