//! The shared completion state behind one Future/Promise pair.
//!
//! A cell transitions `Pending → Ready | Failed | Discarded` exactly once.
//! Continuations are delivered by a single drain task per cell, in
//! registration order, never on the stack of the call that resolved the
//! cell or registered the continuation.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::outcome::Outcome;

pub(crate) type AnyCallback<T> = Box<dyn FnOnce(Outcome<T>) + Send + 'static>;
pub(crate) type DiscardHandler = Box<dyn FnOnce() + Send + 'static>;

enum CellState<T> {
    Pending,
    Done(Outcome<T>),
}

struct CellInner<T> {
    state: CellState<T>,
    /// Continuations in registration order.
    callbacks: VecDeque<AnyCallback<T>>,
    /// Producer-side hooks fired when a discard is requested while pending.
    discard_handlers: Vec<DiscardHandler>,
    /// Reader-side advisory cancellation latch; set at most once.
    discard_requested: bool,
    /// A drain task is currently delivering callbacks.
    firing: bool,
}

pub(crate) struct Cell<T> {
    inner: Mutex<CellInner<T>>,
    /// Runtime that hosts callback drains for this cell.
    runtime: Handle,
}

impl<T: Clone + Send + 'static> Cell<T> {
    pub(crate) fn new(runtime: Handle) -> Self {
        Cell {
            inner: Mutex::new(CellInner {
                state: CellState::Pending,
                callbacks: VecDeque::new(),
                discard_handlers: Vec::new(),
                discard_requested: false,
                firing: false,
            }),
            runtime,
        }
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Transition to a terminal state.
    ///
    /// Returns `false` (leaving the cell untouched) when the transition
    /// races cancellation in either direction: the cell is already
    /// discarded, or the new outcome is a discard landing on a delivered
    /// result. Delivering twice to a cell that is already ready or failed
    /// is double delivery and panics.
    pub(crate) fn complete(cell: &Arc<Self>, outcome: Outcome<T>) -> bool {
        {
            let mut guard = cell.inner.lock();
            let inner = &mut *guard;
            match &inner.state {
                CellState::Pending => {
                    inner.state = CellState::Done(outcome);
                    // Terminal: producer hooks can no longer fire.
                    inner.discard_handlers.clear();
                }
                CellState::Done(Outcome::Discarded) => return false,
                CellState::Done(_) => {
                    if matches!(outcome, Outcome::Discarded) {
                        return false;
                    }
                    panic!("completion cell resolved twice (double delivery)");
                }
            }
            if inner.callbacks.is_empty() || inner.firing {
                return true;
            }
            inner.firing = true;
        }
        Self::spawn_drain(cell);
        true
    }

    /// Register a continuation for the terminal outcome.
    ///
    /// Never invoked inline; on an already-terminal cell delivery is
    /// scheduled immediately.
    pub(crate) fn register(cell: &Arc<Self>, callback: AnyCallback<T>) {
        {
            let mut guard = cell.inner.lock();
            let inner = &mut *guard;
            inner.callbacks.push_back(callback);
            if matches!(inner.state, CellState::Pending) || inner.firing {
                return;
            }
            inner.firing = true;
        }
        Self::spawn_drain(cell);
    }

    /// Set the discard request latch and fire producer hooks.
    ///
    /// Advisory: the state stays pending until the producer honors the
    /// request. No-op on terminal cells and on repeat requests.
    pub(crate) fn request_discard(&self) {
        let handlers = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, CellState::Pending) || inner.discard_requested {
                return;
            }
            inner.discard_requested = true;
            std::mem::take(&mut inner.discard_handlers)
        };
        if !handlers.is_empty() {
            self.runtime.spawn(async move {
                for handler in handlers {
                    handler();
                }
            });
        }
    }

    /// Register a producer-side hook on the discard request latch.
    ///
    /// Scheduled immediately if the latch is already set while the cell is
    /// still pending; dropped once the cell is terminal.
    pub(crate) fn register_discard_handler(&self, handler: DiscardHandler) {
        {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, CellState::Pending) {
                return;
            }
            if !inner.discard_requested {
                inner.discard_handlers.push(handler);
                return;
            }
        }
        // Latch already set: the hook fires right away, off this stack.
        self.runtime.spawn(async move {
            handler();
        });
    }

    pub(crate) fn has_discard(&self) -> bool {
        self.inner.lock().discard_requested
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(self.inner.lock().state, CellState::Pending)
    }

    pub(crate) fn outcome(&self) -> Option<Outcome<T>> {
        match &self.inner.lock().state {
            CellState::Pending => None,
            CellState::Done(outcome) => Some(outcome.clone()),
        }
    }

    /// One drain task at a time per cell: pops callbacks in order and
    /// invokes them outside the lock, so continuations may re-enter the
    /// cell freely.
    fn spawn_drain(cell: &Arc<Self>) {
        let cell = cell.clone();
        let runtime = cell.runtime.clone();
        runtime.spawn(async move {
            loop {
                let (callback, outcome) = {
                    let mut guard = cell.inner.lock();
                    let inner = &mut *guard;
                    let Some(callback) = inner.callbacks.pop_front() else {
                        inner.firing = false;
                        break;
                    };
                    match &inner.state {
                        CellState::Done(outcome) => (callback, outcome.clone()),
                        // `firing` is only ever set on terminal cells.
                        CellState::Pending => {
                            inner.callbacks.push_front(callback);
                            inner.firing = false;
                            break;
                        }
                    }
                };
                callback(outcome);
            }
        });
    }
}
