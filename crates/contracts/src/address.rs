//! Address - routing key
//!
//! Addresses name segments inside a pipeline and the two halves of a stream.
//! They are used for routing diagnostics and for address-resolved dispatch.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Cheaply clonable string address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(Arc<str>);

impl Address {
    /// Create address from any string-like value
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    /// Borrow as &str
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty (unassigned) address
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::new("")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<&String> for Address {
    fn from(value: &String) -> Self {
        Self::new(value)
    }
}

impl From<&Address> for Address {
    fn from(value: &Address) -> Self {
        value.clone()
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Address {
    fn borrow(&self) -> &str {
        &self.0
    }
}
