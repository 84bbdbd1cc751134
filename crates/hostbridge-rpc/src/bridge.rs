//! Cross-thread execution bridge onto the privileged host thread.
//!
//! The host application's API may only be called from one thread, and that
//! thread is owned by the host's own scheduler: code cannot simply block on
//! it or call into it. The host instead offers a signal ("run my callback
//! on your thread soon"). The bridge pairs that signal with a FIFO queue:
//!
//! 1. [`submit`](ExecutionBridge::submit) queues a work item from any thread
//!    and raises the signal.
//! 2. The host calls [`on_signal`](ExecutionBridge::on_signal) on its
//!    thread. One item is dequeued and run; if more are waiting, the signal
//!    is raised again.
//! 3. The item's outcome (value, error or panic) goes back to the submitter
//!    through a oneshot channel.
//!
//! Running one item per signal keeps each host turn short, so the host UI
//! stays responsive while a backlog drains. Hosts that coalesce repeated
//! raises into one callback are fine: the re-raise after every item keeps
//! the queue moving.
//!
//! There is no timeout on the host side. A work item that never returns
//! stalls every item behind it; callers bound their wait on the client side.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::error::BridgeError;

/// Host-provided wake-up primitive.
///
/// `raise` must return promptly and must arrange for
/// [`ExecutionBridge::on_signal`] to be called later on the host thread.
/// It is called from arbitrary threads, including the host thread itself.
pub trait HostSignal: Send + Sync {
    fn raise(&self);
}

/// A queued unit of work, type-erased over its return value.
trait Job<C>: Send {
    fn run(self: Box<Self>, host: &mut C);
    fn cancel(self: Box<Self>, reason: BridgeError);
}

struct Task<F, T> {
    action: F,
    completion: oneshot::Sender<Result<T, BridgeError>>,
}

impl<C, F, T> Job<C> for Task<F, T>
where
    F: FnOnce(&mut C) -> T + Send,
    T: Send,
{
    fn run(self: Box<Self>, host: &mut C) {
        let Task { action, completion } = *self;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| action(host)))
            .map_err(|payload| BridgeError::Panicked(panic_message(payload.as_ref())));
        if let Err(BridgeError::Panicked(message)) = &outcome {
            error!(%message, "work item panicked on host thread");
        }
        if completion.send(outcome).is_err() {
            debug!("submitter went away before the work item finished");
        }
    }

    fn cancel(self: Box<Self>, reason: BridgeError) {
        let _ = self.completion.send(Err(reason));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

struct Queue<C> {
    items: VecDeque<Box<dyn Job<C>>>,
    closed: bool,
}

struct Inner<C> {
    queue: Mutex<Queue<C>>,
    signal: OnceLock<Box<dyn HostSignal>>,
    host_thread: OnceLock<ThreadId>,
}

/// Runs submitted closures on the host thread, one per host signal, in
/// submission order.
///
/// Cheap to clone; clones share one queue. `C` is the host context handed
/// to each closure.
pub struct ExecutionBridge<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for ExecutionBridge<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> ExecutionBridge<C> {
    /// Create an uninitialized bridge.
    ///
    /// Submissions fail with [`BridgeError::NotInitialized`] until the host
    /// thread calls [`initialize`](Self::initialize).
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(Queue {
                    items: VecDeque::new(),
                    closed: false,
                }),
                signal: OnceLock::new(),
                host_thread: OnceLock::new(),
            }),
        }
    }

    /// Bind the bridge to the calling thread and the host's signal.
    ///
    /// Must be called on the host thread, once.
    pub fn initialize(&self, signal: impl HostSignal + 'static) -> Result<(), BridgeError> {
        let current = thread::current().id();
        if self.inner.host_thread.set(current).is_err() {
            return Err(BridgeError::AlreadyInitialized);
        }
        if self.inner.signal.set(Box::new(signal)).is_err() {
            return Err(BridgeError::AlreadyInitialized);
        }
        debug!(thread = ?current, "execution bridge initialized");
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has run.
    pub fn is_initialized(&self) -> bool {
        self.inner.signal.get().is_some()
    }

    /// Whether the calling thread is the host thread.
    pub fn is_host_thread(&self) -> bool {
        self.inner.host_thread.get() == Some(&thread::current().id())
    }

    /// Queue `action` and wait for its outcome.
    ///
    /// Never rejects for contention; every call is queued. A panic inside
    /// `action` comes back as [`BridgeError::Panicked`].
    pub async fn submit<T, F>(&self, action: F) -> Result<T, BridgeError>
    where
        F: FnOnce(&mut C) -> T + Send + 'static,
        T: Send + 'static,
    {
        let completion = self.enqueue(action)?;
        completion.await.unwrap_or(Err(BridgeError::Cancelled))
    }

    /// Blocking form of [`submit`](Self::submit), for threads outside any
    /// async runtime.
    ///
    /// Panics if called from within an async runtime, like
    /// `oneshot::Receiver::blocking_recv`.
    pub fn submit_blocking<T, F>(&self, action: F) -> Result<T, BridgeError>
    where
        F: FnOnce(&mut C) -> T + Send + 'static,
        T: Send + 'static,
    {
        let completion = self.enqueue(action)?;
        completion
            .blocking_recv()
            .unwrap_or(Err(BridgeError::Cancelled))
    }

    fn enqueue<T, F>(
        &self,
        action: F,
    ) -> Result<oneshot::Receiver<Result<T, BridgeError>>, BridgeError>
    where
        F: FnOnce(&mut C) -> T + Send + 'static,
        T: Send + 'static,
    {
        let Some(signal) = self.inner.signal.get() else {
            error!("execution bridge used before initialization");
            return Err(BridgeError::NotInitialized);
        };
        if self.is_host_thread() {
            error!("submit called from the host thread; run the action directly instead");
            return Err(BridgeError::ReentrantSubmit);
        }

        let (completion, receiver) = oneshot::channel();
        let pending = {
            let mut queue = self.lock_queue();
            if queue.closed {
                return Err(BridgeError::Closed);
            }
            queue.items.push_back(Box::new(Task { action, completion }));
            queue.items.len()
        };
        debug!(pending, "work item queued");

        signal.raise();
        Ok(receiver)
    }

    /// Host-thread callback: run the oldest queued item.
    ///
    /// Returns `false` when the queue was empty (a spurious or coalesced
    /// signal). Raises the signal again if items remain afterwards.
    pub fn on_signal(&self, host: &mut C) -> bool {
        if !self.is_host_thread() {
            warn!("on_signal called off the host thread; ignoring");
            return false;
        }

        let Some(job) = self.lock_queue().items.pop_front() else {
            return false;
        };
        job.run(host);

        let remaining = self.lock_queue().items.len();
        if remaining > 0 {
            if let Some(signal) = self.inner.signal.get() {
                signal.raise();
            }
        }
        true
    }

    /// Number of queued items not yet started.
    pub fn pending(&self) -> usize {
        self.lock_queue().items.len()
    }

    /// Refuse new work and cancel everything still queued.
    ///
    /// Queued submitters receive [`BridgeError::Cancelled`]; later submits
    /// fail with [`BridgeError::Closed`]. An item already running finishes.
    pub fn close(&self) {
        let drained: Vec<Box<dyn Job<C>>> = {
            let mut queue = self.lock_queue();
            queue.closed = true;
            queue.items.drain(..).collect()
        };
        if !drained.is_empty() {
            warn!(cancelled = drained.len(), "execution bridge closed with work queued");
        }
        for job in drained {
            job.cancel(BridgeError::Cancelled);
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock_queue().closed
    }

    fn lock_queue(&self) -> MutexGuard<'_, Queue<C>> {
        // Jobs run outside the lock, so a poisoned lock still holds a
        // consistent queue.
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> Default for ExecutionBridge<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for ExecutionBridge<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionBridge")
            .field("initialized", &self.is_initialized())
            .field("pending", &self.pending())
            .finish()
    }
}
