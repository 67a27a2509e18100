//! taskmesh-future — completion cells and the Future/Promise handle pair.
//!
//! Every asynchronous result in the substrate is backed by one shared
//! completion cell: pending until its unique writer resolves it ready,
//! failed, or discarded, exactly once. [`Promise`] is the writer; [`Future`]
//! is a clonable read handle on the same cell.
//!
//! Continuations registered on a future never run on the stack of the call
//! that triggered them — delivery is scheduled on the cell's runtime,
//! serialized per cell, in registration order. The loop combinator built on
//! top of this crate depends on that invariant to stay stack-bounded.
//!
//! Cancellation is advisory: [`Future::discard`] sets a request latch and
//! fires producer-side [`Future::on_discard`] hooks; the producer decides
//! whether and when to honor the request by resolving the cell.

mod cell;

pub mod future;
pub mod outcome;
pub mod promise;

pub use future::Future;
pub use outcome::Outcome;
pub use promise::Promise;
