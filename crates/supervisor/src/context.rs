//! Context - task tracking, cancellation and terminal error

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use contracts::FlowError;
use futures::FutureExt;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, instrument, warn};

use crate::options::GoOptions;

/// Supervision context
///
/// Cheap to clone; clones share the task set, the cancellation signal and the
/// terminal error.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
    token: CancellationToken,
}

struct Inner {
    key: String,
    tracker: TaskTracker,
    first_err: OnceLock<FlowError>,
    running: AtomicUsize,
}

impl Context {
    /// Create an isolated root context
    pub fn new(key: impl Into<String>) -> Self {
        Self::with_token(key.into(), CancellationToken::new())
    }

    /// Create a child context
    ///
    /// The child has its own task set and terminal error, and is cancelled
    /// whenever `self` is. Cancelling the child leaves the parent running.
    pub fn child(&self, key: impl Into<String>) -> Self {
        Self::with_token(key.into(), self.token.child_token())
    }

    fn with_token(key: String, token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                key,
                tracker: TaskTracker::new(),
                first_err: OnceLock::new(),
                running: AtomicUsize::new(0),
            }),
            token,
        }
    }

    /// Context key
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Cancel this context and all children
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the context is cancelled
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Record a failure
    ///
    /// Returns true if `err` became the terminal error.
    pub fn fail(&self, err: FlowError) -> bool {
        self.inner.first_err.set(err).is_ok()
    }

    /// Terminal error recorded so far
    pub fn error(&self) -> Option<FlowError> {
        self.inner.first_err.get().cloned()
    }

    /// Number of tasks currently running
    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Spawn a supervised task
    ///
    /// `factory` builds the task future. It is called once, and again for each
    /// restart permitted by [`GoOptions::retry_on_panic`].
    pub fn go<F, Fut>(&self, factory: F, opts: GoOptions)
    where
        F: FnMut(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
    {
        self.inner.running.fetch_add(1, Ordering::AcqRel);
        let ctx = self.clone();
        self.inner.tracker.spawn(supervise(ctx, factory, opts));
    }

    /// Wait for every task to exit
    ///
    /// Returns the first failure recorded by any task, including cancellation.
    #[instrument(name = "context_wait", skip(self), fields(key = %self.inner.key))]
    pub async fn wait(&self) -> Result<(), FlowError> {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        match self.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Cancel, then wait
    ///
    /// Cancellation itself is not reported as a failure.
    pub async fn shutdown(&self) -> Result<(), FlowError> {
        self.cancel();
        match self.wait().await {
            Err(FlowError::Cancelled) => Ok(()),
            other => other,
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("key", &self.inner.key)
            .field("running", &self.running())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

async fn supervise<F, Fut>(ctx: Context, mut factory: F, opts: GoOptions)
where
    F: FnMut(Context) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
{
    let key = opts.key.clone().unwrap_or_else(|| ctx.key().to_string());
    debug!(task = %key, context = %ctx.key(), "task started");

    let mut attempt = 0;
    let result = loop {
        let fut = factory(ctx.clone());
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => break result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                metrics::counter!("flow_task_panics_total", "task" => key.clone()).increment(1);
                if attempt < opts.max_retries {
                    attempt += 1;
                    warn!(
                        task = %key,
                        attempt,
                        max_retries = opts.max_retries,
                        panic = %message,
                        "task panicked, restarting"
                    );
                    continue;
                }
                if opts.recover_on_panic {
                    error!(task = %key, panic = %message, "recovered task panic");
                    break Err(FlowError::panicked(&key, message));
                }
                error!(task = %key, panic = %message, "unrecovered task panic, cancelling context");
                ctx.fail(FlowError::panicked(&key, message));
                ctx.cancel();
                if let Err(err) = run_defers(&key, &opts, Ok(())) {
                    warn!(task = %key, error = %err, "deferred closer failed after task panic");
                }
                ctx.inner.running.fetch_sub(1, Ordering::AcqRel);
                std::panic::resume_unwind(payload);
            }
        }
    };

    let result = run_defers(&key, &opts, result);
    match result {
        Ok(()) => debug!(task = %key, "task exited"),
        Err(err) => {
            if err.is_cancelled() {
                debug!(task = %key, "task cancelled");
            } else {
                error!(task = %key, error = %err, "task failed");
                metrics::counter!("flow_task_failures_total", "task" => key.clone()).increment(1);
            }
            ctx.fail(err);
            if opts.cancel_on_fail {
                ctx.cancel();
            }
        }
    }
    ctx.inner.running.fetch_sub(1, Ordering::AcqRel);
}

fn run_defers(key: &str, opts: &GoOptions, mut result: Result<(), FlowError>) -> Result<(), FlowError> {
    for deferred in &opts.defers {
        if let Err(err) = deferred() {
            if result.is_ok() {
                result = Err(err);
            } else {
                warn!(task = %key, error = %err, "deferred closer failed after task error");
            }
        }
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn explode(message: &'static str) -> Result<(), FlowError> {
        panic!("{message}")
    }

    #[tokio::test]
    async fn test_wait_ok_when_tasks_succeed() {
        let ctx = Context::new("test");
        for _ in 0..3 {
            ctx.go(|_| async { Ok(()) }, GoOptions::new());
        }
        assert_eq!(ctx.wait().await, Ok(()));
        assert_eq!(ctx.running(), 0);
    }

    #[tokio::test]
    async fn test_first_error_is_terminal() {
        let ctx = Context::new("test");
        ctx.go(
            |_| async { Err(FlowError::task("a", "first")) },
            GoOptions::new().key("a"),
        );
        let result = ctx.wait().await;
        assert_eq!(result, Err(FlowError::task("a", "first")));
    }

    #[tokio::test]
    async fn test_cancel_on_fail_stops_siblings() {
        let ctx = Context::new("test");
        ctx.go(
            |ctx| async move {
                ctx.cancelled().await;
                Err(FlowError::Cancelled)
            },
            GoOptions::new().key("idle"),
        );
        ctx.go(
            |_| async { Err(FlowError::task("bad", "boom")) },
            GoOptions::new().key("bad").cancel_on_fail(),
        );
        let result = timeout(Duration::from_secs(1), ctx.wait()).await.unwrap();
        assert_eq!(result, Err(FlowError::task("bad", "boom")));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_recover_on_panic() {
        let ctx = Context::new("test");
        ctx.go(
            |_| explode("kaboom"),
            GoOptions::new().key("panicky").recover_on_panic(),
        );
        let result = ctx.wait().await;
        assert_eq!(result, Err(FlowError::panicked("panicky", "kaboom")));
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_unrecovered_panic_cancels_context() {
        let ctx = Context::new("test");
        ctx.go(|_| explode("fatal"), GoOptions::new().key("fatal"));
        let result = ctx.wait().await;
        assert_eq!(result, Err(FlowError::panicked("fatal", "fatal")));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_unrecovered_panic_runs_failing_defer_once() {
        let ctx = Context::new("test");
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        ctx.go(
            |_| explode("fatal"),
            GoOptions::new().key("fatal").defer(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(FlowError::other("close failed"))
            }),
        );
        // The panic stays the terminal error; the closer failure is only logged
        let result = ctx.wait().await;
        assert_eq!(result, Err(FlowError::panicked("fatal", "fatal")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.running(), 0);
    }

    #[tokio::test]
    async fn test_retry_on_panic_restarts_task() {
        let ctx = Context::new("test");
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        ctx.go(
            move |_| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        explode("flaky").await?;
                    }
                    Ok(())
                }
            },
            GoOptions::new().retry_on_panic(3).recover_on_panic(),
        );
        assert_eq!(ctx.wait().await, Ok(()));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_reports_panic() {
        let ctx = Context::new("test");
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        ctx.go(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                explode("always")
            },
            GoOptions::new().key("always").retry_on_panic(2).recover_on_panic(),
        );
        assert_eq!(
            ctx.wait().await,
            Err(FlowError::panicked("always", "always"))
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_defer_runs_once_and_reports_error() {
        let ctx = Context::new("test");
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        ctx.go(
            |_| async { Ok(()) },
            GoOptions::new().defer(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(FlowError::other("close failed"))
            }),
        );
        assert_eq!(ctx.wait().await, Err(FlowError::other("close failed")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_child_cancelled_with_parent() {
        let parent = Context::new("parent");
        let child = parent.child("child");
        child.go(
            |ctx| async move {
                ctx.cancelled().await;
                Err(FlowError::Cancelled)
            },
            GoOptions::new(),
        );
        parent.cancel();
        let result = timeout(Duration::from_secs(1), child.wait()).await.unwrap();
        assert_eq!(result, Err(FlowError::Cancelled));
    }

    #[tokio::test]
    async fn test_shutdown_hides_cancellation() {
        let ctx = Context::new("test");
        ctx.go(
            |ctx| async move {
                ctx.cancelled().await;
                Err(FlowError::Cancelled)
            },
            GoOptions::new(),
        );
        assert_eq!(ctx.shutdown().await, Ok(()));
    }
}
