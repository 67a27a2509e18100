//! taskmesh-exec — serialized execution contexts over the shared worker pool.
//!
//! An [`ExecContext`] is a logical actor: a stable address, an internal
//! queue, and a single drain task on the Tokio worker pool that runs
//! submitted operations one at a time, in submission order, never
//! concurrently with itself. Many contexts multiplex over the same pool;
//! operations on different contexts carry no relative ordering guarantee.
//!
//! Two submission primitives build on the queue:
//!
//! - [`ExecContext::dispatch`] submits work and returns a
//!   [`taskmesh_future::Future`] of its result;
//! - [`ExecContext::defer`] binds a callback to the context: invoking the
//!   returned [`Deferred`] enqueues the wrapped callback instead of running
//!   it inline, which is how a future completing on an arbitrary thread
//!   hands control back to a chosen context.

pub mod context;
pub mod defer;
pub mod error;

pub use context::{ContextAddr, ExecContext};
pub use defer::Deferred;
pub use error::{ContextError, ContextResult};
