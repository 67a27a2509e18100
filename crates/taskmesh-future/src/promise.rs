//! The unique writer handle of a completion cell.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::debug;

use crate::cell::Cell;
use crate::future::Future;
use crate::outcome::Outcome;

/// The unique writer of an asynchronous result.
///
/// A promise resolves its cell at most once: [`Promise::set`],
/// [`Promise::fail`], and [`Promise::discard`] each transition
/// `Pending → terminal` and return whether the transition happened.
/// Dropping a promise while its cell is still pending fails the result
/// (a "broken promise"), so lost work surfaces instead of hanging readers.
pub struct Promise<T: Clone + Send + 'static> {
    cell: Arc<Cell<T>>,
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Create a promise whose callbacks are scheduled on the ambient Tokio
    /// runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime context.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    /// Create a promise whose callbacks are scheduled on the given runtime.
    pub fn with_handle(runtime: Handle) -> Self {
        Promise {
            cell: Arc::new(Cell::new(runtime)),
        }
    }

    /// A read handle on this promise's result.
    pub fn future(&self) -> Future<T> {
        Future::from_cell(self.cell.clone())
    }

    /// Resolve with a value.
    ///
    /// Returns `false` without effect when the cell was already discarded.
    ///
    /// # Panics
    ///
    /// Panics if the cell is already ready or failed — double delivery is a
    /// contract violation, not a recoverable condition.
    pub fn set(&self, value: T) -> bool {
        Cell::complete(&self.cell, Outcome::Ready(value))
    }

    /// Resolve with a failure message, forwarded verbatim to readers.
    ///
    /// Same return and panic semantics as [`Promise::set`].
    pub fn fail(&self, message: impl Into<String>) -> bool {
        Cell::complete(&self.cell, Outcome::Failed(message.into()))
    }

    /// Honor a discard request (or abandon the result): `Pending → Discarded`.
    ///
    /// Returns `false` without effect when the cell is already terminal —
    /// cancellation racing a delivered result is tolerated in both
    /// directions, unlike double delivery.
    pub fn discard(&self) -> bool {
        Cell::complete(&self.cell, Outcome::Discarded)
    }

    pub(crate) fn complete(&self, outcome: Outcome<T>) -> bool {
        Cell::complete(&self.cell, outcome)
    }
}

impl<T: Clone + Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        // The writer is unique, so nobody else can resolve the cell now.
        if self.cell.is_pending() {
            debug!("promise dropped while pending, failing its future");
            let _ = Cell::complete(
                &self.cell,
                Outcome::Failed("broken promise (writer dropped)".to_string()),
            );
        }
    }
}
