//! taskmesh-loop — a stack-bounded asynchronous loop.
//!
//! Code that would synchronously be written as a loop ends up, in
//! callback-style asynchronous code, as a recursive chain of continuations:
//! every iteration adds a frame, and a long-running loop overflows the
//! stack. [`repeat_on`] converts that shape into a trampoline driven on one
//! execution context. The caller supplies two steps:
//!
//! - `iterate` produces the next value asynchronously;
//! - `body` consumes it and decides, asynchronously, whether to continue.
//!
//! Synchronously this is:
//!
//! ```text
//! let mut go = true;
//! while go {
//!     go = body(iterate());
//! }
//! ```
//!
//! While both steps resolve immediately, the trampoline steps in a plain
//! `loop` — no continuation is scheduled at all, so synchronous pipelines
//! never grow the stack. Only when a step's future is still pending does
//! the trampoline register a single deferred continuation on it, bound to
//! the loop's context, and unwind; the continuation re-enters the
//! trampoline when the result arrives. Binding everything to one context
//! also serializes the loop's state against other code dispatching there.
//!
//! Cancellation is advisory end to end: discarding the returned future
//! discards whichever internal future is outstanding, and the producers
//! behind `iterate`/`body` decide how to honor it.
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! use taskmesh_future::Future;
//! use taskmesh_loop::repeat;
//!
//! let drained = Arc::new(AtomicU32::new(0));
//! let source = drained.clone();
//! let done = repeat(
//!     move || Future::ready(source.fetch_add(1, Ordering::SeqCst)),
//!     |chunk| Future::ready(chunk < 3),
//! );
//! done.wait().await;
//! assert_eq!(drained.load(Ordering::SeqCst), 4);
//! # }
//! ```

pub mod repeat;

pub use repeat::{repeat, repeat_on};
