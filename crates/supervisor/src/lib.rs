//! # Supervisor
//!
//! Supervision context for every concurrent task in the engine.
//!
//! Responsibilities:
//! - Track every spawned task and wait for all of them
//! - Propagate cancellation from parent to child contexts
//! - Keep the first failure as the context's terminal error
//! - Optional panic recovery, bounded restart and deferred closers per task
//!
//! ## Usage Example
//!
//! ```ignore
//! use supervisor::{Context, GoOptions};
//!
//! let ctx = Context::new("writer");
//! ctx.go(
//!     |ctx| async move {
//!         ctx.cancelled().await;
//!         Err(contracts::FlowError::Cancelled)
//!     },
//!     GoOptions::new().key("idle").recover_on_panic(),
//! );
//! ctx.cancel();
//! assert!(ctx.wait().await.is_err());
//! ```

mod context;
mod options;

pub use context::Context;
pub use options::{Deferred, GoOptions};
