//! Deferred callbacks — invocations are enqueued, never run inline.

use std::sync::Arc;

use tracing::debug;

use crate::context::ExecContext;

/// A reusable callback bound to an execution context.
///
/// Invoking it enqueues the wrapped callback on the context instead of
/// running it inline, so a future completing on an arbitrary thread hands
/// control back to the bound context. Clones share the same callback and
/// context; calls preserve enqueue order.
pub struct Deferred<A> {
    context: ExecContext,
    callback: Arc<dyn Fn(A) + Send + Sync + 'static>,
}

impl<A> Clone for Deferred<A> {
    fn clone(&self) -> Self {
        Deferred {
            context: self.context.clone(),
            callback: self.callback.clone(),
        }
    }
}

impl<A: Send + 'static> Deferred<A> {
    /// Enqueue the wrapped callback with `argument`.
    ///
    /// Calls against a terminated context are dropped with a log line —
    /// there is no result future to fail.
    pub fn call(&self, argument: A) {
        let callback = self.callback.clone();
        if let Err(error) = self.context.execute(move || callback(argument)) {
            debug!(context = %self.context.addr(), %error, "deferred callback dropped");
        }
    }
}

impl ExecContext {
    /// Bind a reusable callback to this context.
    pub fn defer<A, F>(&self, callback: F) -> Deferred<A>
    where
        A: Send + 'static,
        F: Fn(A) + Send + Sync + 'static,
    {
        Deferred {
            context: self.clone(),
            callback: Arc::new(callback),
        }
    }

    /// Bind a one-shot continuation to this context.
    ///
    /// Exists for continuations that consume owned state, which a reusable
    /// [`Deferred`] cannot hold. Same drop semantics as [`Deferred::call`]
    /// when the context is terminated.
    pub fn defer_once<A, F>(&self, continuation: F) -> Box<dyn FnOnce(A) + Send>
    where
        A: Send + 'static,
        F: FnOnce(A) + Send + 'static,
    {
        let context = self.clone();
        Box::new(move |argument| {
            if let Err(error) = context.execute(move || continuation(argument)) {
                debug!(context = %context.addr(), %error, "deferred continuation dropped");
            }
        })
    }
}
