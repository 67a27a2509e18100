//! The loop trampoline and its two public entry points.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use taskmesh_exec::{ContextError, ExecContext};
use taskmesh_future::{Future, Outcome, Promise};

/// The loop's current futures, shared only with its persistent discard
/// handler. Every access runs on the bound context, so the lock is never
/// contended across contexts.
struct Current<T: Clone + Send + 'static> {
    /// Future of the next value, once `iterate` has been called.
    value: Option<Future<T>>,
    /// Future of the continue/stop decision, once `body` has been called.
    decision: Option<Future<bool>>,
}

/// Per-invocation loop state, uniquely owned by the trampoline and moved
/// through each step.
struct LoopState<T, I, B>
where
    T: Clone + Send + 'static,
{
    ctx: ExecContext,
    iterate: I,
    body: B,
    promise: Promise<()>,
    /// Reader handle on the result, for discard-latch checks.
    result: Future<()>,
    current: Arc<Mutex<Current<T>>>,
}

impl<T, I, B> LoopState<T, I, B>
where
    T: Clone + Send + 'static,
    I: FnMut() -> Future<T> + Send + 'static,
    B: FnMut(T) -> Future<bool> + Send + 'static,
{
    /// Invoke `iterate` and install its future as the current value future.
    ///
    /// A discard already requested on the result is forwarded to the new
    /// future immediately, so a request arriving mid-burst is honored at
    /// the next suspension point.
    fn advance(&mut self) {
        let future = (self.iterate)();
        if self.result.has_discard() {
            future.discard();
        }
        self.current.lock().value = Some(future);
    }

    /// Invoke `body` and install its future as the current decision future.
    fn decide(&mut self, value: T) -> Future<bool> {
        let decision = (self.body)(value);
        if self.result.has_discard() {
            decision.discard();
        }
        self.current.lock().decision = Some(decision.clone());
        decision
    }
}

/// One trampoline pass. Runs on the bound context; consumes the loop state
/// and either resolves the result promise, or re-registers itself as a
/// deferred continuation on whichever future is not yet resolved.
fn run<T, I, B>(mut state: Box<LoopState<T, I, B>>)
where
    T: Clone + Send + 'static,
    I: FnMut() -> Future<T> + Send + 'static,
    B: FnMut(T) -> Future<bool> + Send + 'static,
{
    loop {
        // Fast path: while the iterate future is already resolved, keep
        // stepping in place instead of scheduling a continuation.
        let outcome = {
            let current = state.current.lock();
            current.value.as_ref().and_then(|future| future.outcome())
        };
        let value = match outcome {
            Some(Outcome::Ready(value)) => value,
            Some(Outcome::Failed(message)) => {
                let _ = state.promise.fail(message);
                return;
            }
            Some(Outcome::Discarded) => {
                let _ = state.promise.discard();
                return;
            }
            None => {
                let pending = { state.current.lock().value.clone() };
                let Some(pending) = pending else {
                    // start() installs an iterate future before the first pass
                    let _ = state.promise.fail("loop started without an iteration future");
                    return;
                };
                let ctx = state.ctx.clone();
                pending.on_any(ctx.defer_once(move |outcome: Outcome<T>| match outcome {
                    Outcome::Ready(_) => run(state),
                    Outcome::Failed(message) => {
                        let _ = state.promise.fail(message);
                    }
                    Outcome::Discarded => {
                        let _ = state.promise.discard();
                    }
                }));
                return;
            }
        };

        let decision = state.decide(value);
        match decision.outcome() {
            Some(Outcome::Ready(true)) => {
                state.advance();
            }
            Some(Outcome::Ready(false)) => {
                let _ = state.promise.set(());
                return;
            }
            Some(Outcome::Failed(message)) => {
                let _ = state.promise.fail(message);
                return;
            }
            Some(Outcome::Discarded) => {
                let _ = state.promise.discard();
                return;
            }
            None => {
                let ctx = state.ctx.clone();
                decision.on_any(ctx.defer_once(move |outcome: Outcome<bool>| match outcome {
                    Outcome::Ready(true) => {
                        let mut state = state;
                        state.advance();
                        run(state);
                    }
                    Outcome::Ready(false) => {
                        let _ = state.promise.set(());
                    }
                    Outcome::Failed(message) => {
                        let _ = state.promise.fail(message);
                    }
                    Outcome::Discarded => {
                        let _ = state.promise.discard();
                    }
                }));
                return;
            }
        }
    }
}

/// Run an asynchronous loop on `ctx`.
///
/// `iterate` produces the next value; `body` consumes it and returns
/// whether to continue. The returned future resolves ready once `body`
/// answers `false`, failed (message forwarded verbatim) if either step's
/// future fails, and discarded if a discard request on it is honored by
/// the producers. Exactly one terminal event fires per invocation; the
/// loop never retries.
pub fn repeat_on<T, I, B>(ctx: &ExecContext, iterate: I, body: B) -> Future<()>
where
    T: Clone + Send + 'static,
    I: FnMut() -> Future<T> + Send + 'static,
    B: FnMut(T) -> Future<bool> + Send + 'static,
{
    if ctx.is_terminated() {
        let promise = Promise::with_handle(ctx.runtime().clone());
        let result = promise.future();
        let _ = promise.fail(ContextError::Unavailable(ctx.addr().clone()).to_string());
        return result;
    }

    let promise = Promise::with_handle(ctx.runtime().clone());
    let result = promise.future();

    let current = Arc::new(Mutex::new(Current {
        value: None,
        decision: None,
    }));
    let state = Box::new(LoopState {
        ctx: ctx.clone(),
        iterate,
        body,
        promise,
        result: result.clone(),
        current: current.clone(),
    });

    // One persistent discard handler for the whole loop lifetime (rather
    // than one per future per iteration): deferred onto the bound context,
    // it discards whichever current future is outstanding. Newly created
    // futures are checked against the latch on creation, so a request is
    // never lost between the handler firing and the next suspension point.
    let propagate = ctx.defer(move |()| {
        let current = current.lock();
        if let Some(future) = &current.value {
            future.discard();
        }
        if let Some(future) = &current.decision {
            future.discard();
        }
    });
    result.on_discard(move || propagate.call(()));

    debug!(context = %ctx.addr(), "starting loop");
    if ctx
        .execute(move || {
            let mut state = state;
            state.advance();
            run(state);
        })
        .is_err()
    {
        // The start job went down with the loop state; dropping its promise
        // has already failed the result, so this is surfaced, not hung.
        trace!(context = %ctx.addr(), "loop start dropped, context terminated");
    }
    result
}

/// Run an asynchronous loop on a private, anonymous context.
///
/// Spawns a context to host the loop and tears it down (terminate + join)
/// once the result future is terminal. The teardown runs off the dying
/// context, so it cannot deadlock the context's own drain task.
///
/// # Panics
///
/// Panics when called outside a Tokio runtime context.
pub fn repeat<T, I, B>(iterate: I, body: B) -> Future<()>
where
    T: Clone + Send + 'static,
    I: FnMut() -> Future<T> + Send + 'static,
    B: FnMut(T) -> Future<bool> + Send + 'static,
{
    let ctx = ExecContext::spawn("loop");
    let result = repeat_on(&ctx, iterate, body);

    let runtime = ctx.runtime().clone();
    result.on_any(move |_| {
        ctx.terminate();
        runtime.spawn(async move {
            ctx.join().await;
            trace!(context = %ctx.addr(), "loop context torn down");
        });
    });

    result
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn counts_the_documented_example() {
        // iterate yields 0,1,2,3,...; body continues while v < 3.
        let iterations = Arc::new(AtomicUsize::new(0));
        let decisions = Arc::new(AtomicUsize::new(0));
        let next = iterations.clone();
        let decided = decisions.clone();
        let result = repeat(
            move || Future::ready(next.fetch_add(1, Ordering::SeqCst)),
            move |value| {
                decided.fetch_add(1, Ordering::SeqCst);
                Future::ready(value < 3)
            },
        );
        assert_eq!(result.wait().await, Outcome::Ready(()));
        // Called for 0, 1, 2, 3 — four times each, nothing after the stop.
        assert_eq!(iterations.load(Ordering::SeqCst), 4);
        assert_eq!(decisions.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn spins_until_the_condition_clears() {
        let value = Arc::new(AtomicI64::new(1));
        let ctx = ExecContext::spawn("poller");
        let shared = value.clone();
        let result = repeat_on(
            &ctx,
            move || Future::ready(shared.load(Ordering::SeqCst)),
            |v| Future::ready(v != 0),
        );
        assert!(result.is_pending());
        value.store(0, Ordering::SeqCst);
        assert_eq!(result.wait().await, Outcome::Ready(()));
    }

    #[tokio::test]
    async fn suspends_until_values_and_decisions_arrive() {
        let ctx = ExecContext::spawn("feeder");
        let value_promise = Promise::<i64>::new();
        let decision_promise = Promise::<bool>::new();
        let observed_promise = Promise::<i64>::new();
        let observed = observed_promise.future();

        let mut staged_value = Some(value_promise.future());
        let mut staged_decision = Some(decision_promise.future());
        let result = repeat_on(
            &ctx,
            move || {
                staged_value
                    .take()
                    .unwrap_or_else(|| Future::failed("iterate called again"))
            },
            move |value| {
                let _ = observed_promise.set(value);
                staged_decision
                    .take()
                    .unwrap_or_else(|| Future::failed("body called again"))
            },
        );

        assert!(result.is_pending());
        assert!(value_promise.set(1));
        assert_eq!(observed.wait().await, Outcome::Ready(1));
        assert!(result.is_pending());
        assert!(decision_promise.set(false));
        assert_eq!(result.wait().await, Outcome::Ready(()));
    }

    #[tokio::test]
    async fn stays_stack_bounded_over_many_ready_iterations() {
        let count = Arc::new(AtomicUsize::new(0));
        let next = count.clone();
        let result = repeat(
            move || Future::ready(next.fetch_add(1, Ordering::SeqCst)),
            |value| Future::ready(value < 50_000),
        );
        assert_eq!(result.wait().await, Outcome::Ready(()));
        assert_eq!(count.load(Ordering::SeqCst), 50_001);
    }

    #[tokio::test]
    async fn iterate_failure_stops_the_loop_verbatim() {
        let calls = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(AtomicUsize::new(0));
        let next = calls.clone();
        let decided = bodies.clone();
        let result = repeat(
            move || {
                let call = next.fetch_add(1, Ordering::SeqCst);
                if call == 1 {
                    Future::failed("image store offline")
                } else {
                    Future::ready(call)
                }
            },
            move |_| {
                decided.fetch_add(1, Ordering::SeqCst);
                Future::ready(true)
            },
        );
        assert_eq!(
            result.wait().await,
            Outcome::Failed("image store offline".to_string())
        );
        // The body never sees the failed step.
        assert_eq!(bodies.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn body_failure_stops_the_loop_verbatim() {
        let result = repeat(
            || Future::ready(1u32),
            |_| Future::<bool>::failed("attach rejected"),
        );
        assert_eq!(
            result.wait().await,
            Outcome::Failed("attach rejected".to_string())
        );
    }

    #[tokio::test]
    async fn discard_propagates_to_the_outstanding_future() {
        let ctx = ExecContext::spawn("reader");
        let source = Promise::<u8>::new();
        let pending = source.future();
        // The producer honors discard requests, as an I/O source would.
        pending.on_discard(move || {
            let _ = source.discard();
        });

        let bodies = Arc::new(AtomicUsize::new(0));
        let decided = bodies.clone();
        let mut staged = Some(pending);
        let result = repeat_on(
            &ctx,
            move || {
                staged
                    .take()
                    .unwrap_or_else(|| Future::failed("iterate called again"))
            },
            move |_| {
                decided.fetch_add(1, Ordering::SeqCst);
                Future::ready(true)
            },
        );

        result.discard();
        assert_eq!(result.wait().await, Outcome::Discarded);
        assert_eq!(bodies.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn result_resolution_is_stable_after_completion() {
        let result = repeat(|| Future::ready(0u8), |_| Future::ready(false));
        assert_eq!(result.wait().await, Outcome::Ready(()));
        result.discard();
        assert_eq!(result.outcome(), Some(Outcome::Ready(())));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn loops_sharing_a_context_never_interleave_steps() {
        let ctx = ExecContext::spawn("shared");
        let busy = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let total = Arc::new(AtomicUsize::new(0));

        let mut results = Vec::new();
        for _ in 0..2 {
            let busy = busy.clone();
            let overlaps = overlaps.clone();
            let total = total.clone();
            let steps = Arc::new(AtomicUsize::new(0));
            results.push(repeat_on(
                &ctx,
                move || Future::ready(steps.fetch_add(1, Ordering::SeqCst)),
                move |value| {
                    if busy.swap(true, Ordering::SeqCst) {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    total.fetch_add(1, Ordering::SeqCst);
                    busy.store(false, Ordering::SeqCst);
                    Future::ready(value < 500)
                },
            ));
        }
        for result in results {
            assert_eq!(result.wait().await, Outcome::Ready(()));
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        // 501 body steps per loop: values 0..=500.
        assert_eq!(total.load(Ordering::SeqCst), 2 * 501);
    }

    #[tokio::test]
    async fn loop_on_terminated_context_fails() {
        let ctx = ExecContext::spawn("dead");
        ctx.terminate();
        let result = repeat_on(&ctx, || Future::ready(1u8), |_| Future::ready(false));
        match result.wait().await {
            Outcome::Failed(message) => {
                assert!(message.contains("execution context unavailable"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
