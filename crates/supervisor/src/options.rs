//! Per-task start options

use std::fmt;
use std::sync::Arc;

use contracts::FlowError;

/// Closer run once when a task finally exits
pub type Deferred = Arc<dyn Fn() -> Result<(), FlowError> + Send + Sync>;

/// Options applied to a single supervised task
#[derive(Clone, Default)]
pub struct GoOptions {
    /// Task key used in logs, metrics and failures
    pub key: Option<String>,

    /// Convert a panic into an ordinary task failure
    pub recover_on_panic: bool,

    /// Restart the task after a panic up to this many times
    pub max_retries: u32,

    /// Cancel the owning context when the task fails
    pub cancel_on_fail: bool,

    /// Closers run after the last attempt, in registration order
    pub defers: Vec<Deferred>,
}

impl GoOptions {
    /// Create default options (no recovery, no retry, no closers)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set task key
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Recover panics as task failures
    pub fn recover_on_panic(mut self) -> Self {
        self.recover_on_panic = true;
        self
    }

    /// Restart after panic up to `max` times
    pub fn retry_on_panic(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Cancel context on failure
    pub fn cancel_on_fail(mut self) -> Self {
        self.cancel_on_fail = true;
        self
    }

    /// Register closer
    pub fn defer(mut self, f: impl Fn() -> Result<(), FlowError> + Send + Sync + 'static) -> Self {
        self.defers.push(Arc::new(f));
        self
    }
}

impl fmt::Debug for GoOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoOptions")
            .field("key", &self.key)
            .field("recover_on_panic", &self.recover_on_panic)
            .field("max_retries", &self.max_retries)
            .field("cancel_on_fail", &self.cancel_on_fail)
            .field("defers", &self.defers.len())
            .finish()
    }
}
