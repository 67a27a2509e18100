//! Read handles on completion cells.

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::cell::Cell;
use crate::outcome::Outcome;
use crate::promise::Promise;

/// A read-only, clonable view of an asynchronous result.
///
/// Clones share the same completion cell. Continuations registered through
/// the `on_*` methods are delivered in registration order, serialized per
/// cell, and never on the stack of the registering or resolving call.
pub struct Future<T: Clone + Send + 'static> {
    cell: Arc<Cell<T>>,
}

impl<T: Clone + Send + 'static> Clone for Future<T> {
    fn clone(&self) -> Self {
        Future {
            cell: self.cell.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Future<T> {
    pub(crate) fn from_cell(cell: Arc<Cell<T>>) -> Self {
        Future { cell }
    }

    /// An already-ready future.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime context.
    pub fn ready(value: T) -> Self {
        let promise = Promise::new();
        let future = promise.future();
        let _ = promise.set(value);
        future
    }

    /// An already-failed future.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime context.
    pub fn failed(message: impl Into<String>) -> Self {
        let promise = Promise::new();
        let future = promise.future();
        let _ = promise.fail(message);
        future
    }

    /// Non-blocking terminal snapshot; `None` while pending.
    pub fn outcome(&self) -> Option<Outcome<T>> {
        self.cell.outcome()
    }

    pub fn is_pending(&self) -> bool {
        self.cell.is_pending()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.outcome(), Some(Outcome::Ready(_)))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome(), Some(Outcome::Failed(_)))
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self.outcome(), Some(Outcome::Discarded))
    }

    /// Whether a discard has been requested on this result.
    pub fn has_discard(&self) -> bool {
        self.cell.has_discard()
    }

    /// Request cancellation.
    ///
    /// Advisory: sets the request latch and fires [`Future::on_discard`]
    /// hooks, but the state stays pending until the producer honors the
    /// request. No-op on terminal cells and on repeat requests.
    pub fn discard(&self) {
        self.cell.request_discard();
    }

    /// Register a continuation receiving the terminal [`Outcome`].
    ///
    /// If the cell is already terminal the continuation is scheduled
    /// immediately; it is never invoked inline during registration.
    pub fn on_any(&self, callback: impl FnOnce(Outcome<T>) + Send + 'static) {
        Cell::register(&self.cell, Box::new(callback));
    }

    /// Register a continuation for the `Ready` outcome only.
    pub fn on_ready(&self, callback: impl FnOnce(T) + Send + 'static) {
        self.on_any(move |outcome| {
            if let Outcome::Ready(value) = outcome {
                callback(value);
            }
        });
    }

    /// Register a continuation for the `Failed` outcome only.
    pub fn on_failed(&self, callback: impl FnOnce(String) + Send + 'static) {
        self.on_any(move |outcome| {
            if let Outcome::Failed(message) = outcome {
                callback(message);
            }
        });
    }

    /// Register a continuation for the `Discarded` outcome only.
    pub fn on_discarded(&self, callback: impl FnOnce() + Send + 'static) {
        self.on_any(move |outcome| {
            if let Outcome::Discarded = outcome {
                callback();
            }
        });
    }

    /// Register a producer-side hook on the discard request latch.
    ///
    /// Fires (scheduled, never inline) when [`Future::discard`] is called
    /// while the cell is still pending; scheduled immediately if the latch
    /// is already set; dropped once the cell is terminal.
    pub fn on_discard(&self, handler: impl FnOnce() + Send + 'static) {
        self.cell.register_discard_handler(Box::new(handler));
    }

    /// Chain a continuation producing its own asynchronous result.
    ///
    /// `Failed` and `Discarded` outcomes chain through untouched; discard
    /// requests on the returned future are forwarded to this future (and to
    /// the continuation's future once it exists).
    pub fn then<U, F>(&self, continuation: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Future<U> + Send + 'static,
    {
        let promise = Promise::with_handle(self.cell.runtime().clone());
        let chained = promise.future();

        let downstream = chained.clone();
        self.on_any(move |outcome| match outcome {
            Outcome::Ready(value) => {
                let inner = continuation(value);
                let target = inner.clone();
                downstream.on_discard(move || target.discard());
                inner.on_any(move |outcome| {
                    let _ = promise.complete(outcome);
                });
            }
            Outcome::Failed(message) => {
                let _ = promise.fail(message);
            }
            Outcome::Discarded => {
                let _ = promise.discard();
            }
        });

        // Requests against the chained result propagate to the source.
        let upstream = self.clone();
        chained.on_discard(move || upstream.discard());

        chained
    }

    /// Await the terminal outcome.
    ///
    /// The one blocking-style boundary of the substrate, for API edges and
    /// tests; the substrate's own machinery always registers continuations
    /// instead.
    pub async fn wait(&self) -> Outcome<T> {
        let (tx, rx) = oneshot::channel();
        self.on_any(move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await
            .unwrap_or_else(|_| Outcome::Failed("result callback dropped".to_string()))
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.outcome() {
            None => "pending",
            Some(Outcome::Ready(_)) => "ready",
            Some(Outcome::Failed(_)) => "failed",
            Some(Outcome::Discarded) => "discarded",
        };
        f.debug_struct("Future").field("state", &state).finish()
    }
}
