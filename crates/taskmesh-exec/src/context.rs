//! Execution contexts — serialized operation queues on the worker pool.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use taskmesh_future::{Future, Promise};

use crate::error::{ContextError, ContextResult};

/// Process-wide source of unique context ids.
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Stable address of an execution context: a human-readable name plus a
/// process-unique id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextAddr {
    id: u64,
    name: Arc<str>,
}

impl ContextAddr {
    /// Process-unique numeric id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Human-readable name given at spawn time (not necessarily unique).
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ContextAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.id)
    }
}

struct ContextInner {
    addr: ContextAddr,
    /// Sender half of the serialized queue; taken on terminate.
    queue: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    /// Drain task handle; taken on join.
    drainer: Mutex<Option<JoinHandle<()>>>,
    /// Runtime hosting the drain task (and dispatch result cells).
    runtime: Handle,
}

/// A logical actor: operations submitted to it run one at a time, in
/// submission order, on the shared worker pool.
///
/// Clones share the same queue. A context is created with
/// [`ExecContext::spawn`] and destroyed with [`ExecContext::terminate`]
/// followed by [`ExecContext::join`]; termination closes the queue but
/// already-enqueued operations still drain.
#[derive(Clone)]
pub struct ExecContext {
    inner: Arc<ContextInner>,
}

impl ExecContext {
    /// Spawn a context on the ambient Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime context.
    pub fn spawn(name: impl Into<String>) -> Self {
        Self::spawn_on(&Handle::current(), name)
    }

    /// Spawn a context whose drain task runs on the given runtime.
    pub fn spawn_on(runtime: &Handle, name: impl Into<String>) -> Self {
        let addr = ContextAddr {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into().into(),
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let drain_addr = addr.clone();
        let drainer = runtime.spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
            trace!(context = %drain_addr, "execution context queue drained");
        });

        debug!(context = %addr, "execution context spawned");
        ExecContext {
            inner: Arc::new(ContextInner {
                addr,
                queue: Mutex::new(Some(tx)),
                drainer: Mutex::new(Some(drainer)),
                runtime: runtime.clone(),
            }),
        }
    }

    /// This context's stable address.
    pub fn addr(&self) -> &ContextAddr {
        &self.inner.addr
    }

    /// Runtime hosting this context's drain task.
    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    /// Submit fire-and-forget work to the queue.
    ///
    /// The primitive [`ExecContext::dispatch`] and [`ExecContext::defer`]
    /// build on. Errors when the context has been terminated.
    pub fn execute<F>(&self, work: F) -> ContextResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let queue = self.inner.queue.lock();
        match queue.as_ref() {
            Some(tx) => tx
                .send(Box::new(work))
                .map_err(|_| ContextError::Unavailable(self.inner.addr.clone())),
            None => Err(ContextError::Unavailable(self.inner.addr.clone())),
        }
    }

    /// Submit work and observe its result.
    ///
    /// The returned future resolves with the work's return value once the
    /// queue drains to it. Dispatching to a terminated context yields a
    /// future failed with the context-unavailable condition.
    pub fn dispatch<T, F>(&self, work: F) -> Future<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let promise = Promise::with_handle(self.inner.runtime.clone());
        let future = promise.future();
        match self.execute(move || {
            let _ = promise.set(work());
        }) {
            Ok(()) => future,
            Err(error) => {
                debug!(context = %self.inner.addr, %error, "dispatch to unavailable context");
                let failed = Promise::with_handle(self.inner.runtime.clone());
                let future = failed.future();
                let _ = failed.fail(error.to_string());
                future
            }
        }
    }

    /// Close the queue. Idempotent; already-enqueued work still drains.
    pub fn terminate(&self) {
        let taken = self.inner.queue.lock().take();
        if taken.is_some() {
            debug!(context = %self.inner.addr, "execution context terminated");
        }
    }

    /// Whether [`ExecContext::terminate`] has been called.
    pub fn is_terminated(&self) -> bool {
        self.inner.queue.lock().is_none()
    }

    /// Await the drain task's exit.
    ///
    /// Returns immediately on repeat calls. The drain task only exits once
    /// the context has been terminated and its queue has drained.
    pub async fn join(&self) {
        let drainer = self.inner.drainer.lock().take();
        if let Some(drainer) = drainer {
            if let Err(join_error) = drainer.await {
                error!(context = %self.inner.addr, error = %join_error, "context drain task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use taskmesh_future::Outcome;

    use super::*;

    #[tokio::test]
    async fn dispatch_returns_the_work_result() {
        let ctx = ExecContext::spawn("worker");
        let result = ctx.dispatch(|| 40 + 2);
        assert_eq!(result.wait().await, Outcome::Ready(42));
    }

    #[tokio::test]
    async fn same_context_work_runs_in_submission_order() {
        let ctx = ExecContext::spawn("worker");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..100 {
            let seen = seen.clone();
            ctx.execute(move || seen.lock().push(i)).unwrap();
        }
        ctx.dispatch(|| ()).wait().await;
        assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn dispatch_after_terminate_fails_the_future() {
        let ctx = ExecContext::spawn("worker");
        ctx.terminate();
        let result = ctx.dispatch(|| 1);
        match result.wait().await {
            Outcome::Failed(message) => {
                assert!(message.contains("execution context unavailable"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn execute_after_terminate_errors() {
        let ctx = ExecContext::spawn("worker");
        ctx.terminate();
        assert!(ctx.is_terminated());
        assert!(ctx.execute(|| ()).is_err());
    }

    #[tokio::test]
    async fn queued_work_drains_before_join_returns() {
        let ctx = ExecContext::spawn("worker");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let seen = seen.clone();
            ctx.execute(move || seen.lock().push(i)).unwrap();
        }
        ctx.terminate();
        ctx.join().await;
        assert_eq!(seen.lock().len(), 10);
    }

    #[tokio::test]
    async fn join_twice_is_a_noop() {
        let ctx = ExecContext::spawn("worker");
        ctx.terminate();
        ctx.join().await;
        ctx.join().await;
    }

    #[tokio::test]
    async fn addr_displays_name_and_id() {
        let ctx = ExecContext::spawn("switchboard");
        let rendered = format!("{}", ctx.addr());
        assert!(rendered.starts_with("switchboard:"));
        assert_eq!(ctx.addr().name(), "switchboard");
    }

    #[tokio::test]
    async fn contexts_have_unique_addresses() {
        let a = ExecContext::spawn("reader");
        let b = ExecContext::spawn("reader");
        assert_ne!(a.addr(), b.addr());
        assert_ne!(a.addr().id(), b.addr().id());
    }
}
