//! Flow start options

use std::fmt;
use std::sync::Arc;

use contracts::{FlowError, SupervisionConfig};
use supervisor::{Deferred, GoOptions};

use crate::segment::CloseInlets;

/// Options passed to [`Flow::flow`](crate::Flow::flow)
///
/// A pipeline merges its own options with the options registered for each
/// entity before starting it.
#[derive(Clone, Default)]
pub struct FlowOptions {
    /// Task key; pipelines set this to the entity address
    pub key: Option<String>,

    /// Close the segment's output inlets once its task exits
    pub close_output_inlets_on_exit: bool,

    /// Cancel the owning context when the task fails
    pub cancel_on_fail: bool,

    /// Convert panics into task failures
    pub recover_on_panic: bool,

    /// Restart after a panic up to this many times
    pub max_retries: u32,

    /// Closers run when the task finally exits
    pub defers: Vec<Deferred>,
}

impl FlowOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set task key
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Close output inlets when the task exits
    pub fn close_output_inlets_on_exit(mut self) -> Self {
        self.close_output_inlets_on_exit = true;
        self
    }

    /// Alias of [`FlowOptions::close_output_inlets_on_exit`]
    pub fn close_inlets_on_exit(self) -> Self {
        self.close_output_inlets_on_exit()
    }

    /// Cancel context on failure
    pub fn cancel_on_fail(mut self) -> Self {
        self.cancel_on_fail = true;
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

    /// Register closer; its error is recorded if the task itself succeeded
    pub fn defer(mut self, f: impl Fn() -> Result<(), FlowError> + Send + Sync + 'static) -> Self {
        self.defers.push(Arc::new(f));
        self
    }

    /// Combine with `other`
    ///
    /// Flags are OR-ed, the larger retry budget wins, closers are concatenated
    /// and `other`'s key takes precedence.
    pub fn merge(mut self, other: FlowOptions) -> Self {
        if other.key.is_some() {
            self.key = other.key;
        }
        self.close_output_inlets_on_exit |= other.close_output_inlets_on_exit;
        self.cancel_on_fail |= other.cancel_on_fail;
        self.recover_on_panic |= other.recover_on_panic;
        self.max_retries = self.max_retries.max(other.max_retries);
        self.defers.extend(other.defers);
        self
    }

    /// Key to use, falling back to `default_key`
    pub fn key_or(&self, default_key: &str) -> String {
        self.key.clone().unwrap_or_else(|| default_key.to_string())
    }

    /// Build supervisor options for one task
    ///
    /// `outputs` are released after the last attempt when
    /// `close_output_inlets_on_exit` is set.
    pub fn go_options(&self, default_key: &str, outputs: impl CloseInlets) -> GoOptions {
        let mut opts = GoOptions::new().key(self.key_or(default_key));
        opts.recover_on_panic = self.recover_on_panic;
        opts.cancel_on_fail = self.cancel_on_fail;
        opts.max_retries = self.max_retries;
        opts.defers = self.defers.clone();
        if self.close_output_inlets_on_exit {
            opts = opts.defer(move || {
                outputs.close_inlets();
                Ok(())
            });
        }
        opts
    }
}

impl From<&SupervisionConfig> for FlowOptions {
    fn from(config: &SupervisionConfig) -> Self {
        Self {
            key: None,
            close_output_inlets_on_exit: config.close_output_inlets_on_exit,
            cancel_on_fail: config.cancel_on_fail,
            recover_on_panic: config.recover_on_panic,
            max_retries: config.max_retries,
            defers: Vec::new(),
        }
    }
}

impl fmt::Debug for FlowOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowOptions")
            .field("key", &self.key)
            .field("close_output_inlets_on_exit", &self.close_output_inlets_on_exit)
            .field("cancel_on_fail", &self.cancel_on_fail)
            .field("recover_on_panic", &self.recover_on_panic)
            .field("max_retries", &self.max_retries)
            .field("defers", &self.defers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Stream;

    #[test]
    fn test_merge_prefers_entity_key_and_ors_flags() {
        let pipeline = FlowOptions::new().key("pipeline").cancel_on_fail().retry_on_panic(1);
        let entity = FlowOptions::new()
            .key("writer")
            .close_output_inlets_on_exit()
            .retry_on_panic(3)
            .defer(|| Ok(()));

        let merged = pipeline.merge(entity);
        assert_eq!(merged.key.as_deref(), Some("writer"));
        assert!(merged.cancel_on_fail);
        assert!(merged.close_output_inlets_on_exit);
        assert!(!merged.recover_on_panic);
        assert_eq!(merged.max_retries, 3);
        assert_eq!(merged.defers.len(), 1);
    }

    #[test]
    fn test_merge_keeps_key_when_other_has_none() {
        let merged = FlowOptions::new().key("a").merge(FlowOptions::new());
        assert_eq!(merged.key_or("fallback"), "a");
        assert_eq!(FlowOptions::new().key_or("fallback"), "fallback");
    }

    #[test]
    fn test_go_options_adds_closer_when_requested() {
        let stream = Stream::<u32>::new(1);
        let opts = FlowOptions::new().close_inlets_on_exit();
        let go = opts.go_options("transform", stream.inlet());
        assert_eq!(go.key.as_deref(), Some("transform"));
        assert_eq!(go.defers.len(), 1);

        (go.defers[0])().unwrap();
        assert!(stream.is_closed());
    }

    #[test]
    fn test_go_options_without_closer() {
        let stream = Stream::<u32>::new(1);
        let go = FlowOptions::new().recover_on_panic().go_options("t", stream.inlet());
        assert!(go.recover_on_panic);
        assert!(go.defers.is_empty());
        assert!(!stream.is_closed());
    }

    #[test]
    fn test_from_supervision_config() {
        let config = SupervisionConfig::default();
        let opts = FlowOptions::from(&config);
        assert_eq!(opts.recover_on_panic, config.recover_on_panic);
        assert_eq!(opts.max_retries, config.max_retries);
        assert_eq!(opts.close_output_inlets_on_exit, config.close_output_inlets_on_exit);
    }
}
