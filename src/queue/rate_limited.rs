//! Policy that paces sends with a token bucket.
//!
//! Each attached processor gets a worker task on a Tokio runtime. Requests are
//! queued in submission order and released at most [`rate`] per second; while
//! the owner is paused the worker holds them. Detaching the manager cancels the
//! worker and drops anything still queued; so does dropping the processor.
//!
//! [`rate`]: RateLimitedQueueManagerBuilder::rate

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use leaky_bucket::RateLimiter;
use parking_lot::Mutex;
use static_assertions::const_assert;
use thiserror::Error;
use tokio::{runtime::Handle, sync::Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::SendError,
    processor::{ProcessorId, SnacProcessor, WeakSnacProcessor},
    queue::QueueManager,
    request::SnacRequest,
};

// Default sends per second when no custom rate is specified.
const DEFAULT_SEND_RATE: usize = 10;
/// Highest supported rate for [`RateLimitedQueueManagerBuilder::rate`].
pub const MAX_SEND_RATE: usize = 10_000;

const_assert!(DEFAULT_SEND_RATE <= MAX_SEND_RATE);

/// Errors returned when building a [`RateLimitedQueueManager`].
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateConfigError {
    /// The provided rate was zero or exceeded [`MAX_SEND_RATE`].
    #[error("invalid rate {0}; must be between 1 and {max}", max = MAX_SEND_RATE)]
    InvalidRate(usize),
    /// No runtime handle was given and none is current.
    #[error("no Tokio runtime available to host send workers")]
    NoRuntime,
}

type Workers = Arc<DashMap<ProcessorId, Arc<Worker>>>;

#[derive(Debug)]
struct Worker {
    owner_id: ProcessorId,
    queue: Mutex<VecDeque<SnacRequest>>,
    paused: AtomicBool,
    wake: Notify,
    shutdown: CancellationToken,
    owner_closed: CancellationToken,
}

impl Worker {
    fn new(owner: &SnacProcessor) -> Self {
        Self {
            owner_id: owner.id(),
            queue: Mutex::new(VecDeque::new()),
            paused: AtomicBool::new(false),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
            owner_closed: owner.closed(),
        }
    }

    fn has_ready(&self) -> bool {
        !self.paused.load(Ordering::Acquire) && !self.queue.lock().is_empty()
    }

    fn pop_ready(&self) -> Option<SnacRequest> {
        if self.paused.load(Ordering::Acquire) {
            return None;
        }
        self.queue.lock().pop_front()
    }

    async fn run(
        self: Arc<Self>,
        owner: WeakSnacProcessor,
        limiter: RateLimiter,
        workers: Workers,
    ) {
        if self.serve(&owner, &limiter).await {
            workers.remove_if(&self.owner_id, |_, worker| Arc::ptr_eq(worker, &self));
            debug!(processor = %self.owner_id, "send worker released after processor was dropped");
        } else {
            debug!(processor = %self.owner_id, "send worker stopped");
        }
    }

    /// Release requests until shut down. Returns `true` if the owner was
    /// dropped.
    async fn serve(&self, owner: &WeakSnacProcessor, limiter: &RateLimiter) -> bool {
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return false,
                () = self.owner_closed.cancelled() => return true,
                () = self.wake.notified() => {}
            }
            while self.has_ready() {
                tokio::select! {
                    biased;
                    () = self.shutdown.cancelled() => return false,
                    () = self.owner_closed.cancelled() => return true,
                    () = limiter.acquire(1) => {}
                }
                let Some(request) = self.pop_ready() else { break };
                let Some(owner) = owner.upgrade() else { return true };
                if let Err(error) = owner.send_immediately(&request) {
                    warn!(processor = %owner.id(), id = ?request.id(), %error, "rate-limited send failed");
                }
            }
        }
    }
}

/// Builder for [`RateLimitedQueueManager`].
///
/// ```rust,no_run
/// use snacframe::queue::RateLimitedQueueManager;
///
/// # async fn demo() {
/// let manager = RateLimitedQueueManager::builder()
///     .rate(20)
///     .build()
///     .expect("failed to build manager");
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimitedQueueManagerBuilder {
    rate: usize,
    runtime: Option<Handle>,
}

impl Default for RateLimitedQueueManagerBuilder {
    fn default() -> Self {
        Self {
            rate: DEFAULT_SEND_RATE,
            runtime: None,
        }
    }
}

impl RateLimitedQueueManagerBuilder {
    /// Set the sustained rate in requests per second.
    #[must_use]
    pub fn rate(mut self, rate: usize) -> Self {
        self.rate = rate;
        self
    }

    /// Host worker tasks on `runtime` instead of the current runtime.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the manager.
    ///
    /// # Errors
    ///
    /// Returns [`RateConfigError::InvalidRate`] if the rate is zero or greater
    /// than [`MAX_SEND_RATE`] and [`RateConfigError::NoRuntime`] if no runtime
    /// was given and none is current.
    pub fn build(self) -> Result<RateLimitedQueueManager, RateConfigError> {
        if self.rate == 0 || self.rate > MAX_SEND_RATE {
            return Err(RateConfigError::InvalidRate(self.rate));
        }
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| RateConfigError::NoRuntime)?,
        };
        Ok(RateLimitedQueueManager {
            rate: self.rate,
            runtime,
            workers: Arc::new(DashMap::new()),
        })
    }
}

/// Releases requests at a bounded rate, holding them while paused.
#[derive(Debug)]
pub struct RateLimitedQueueManager {
    rate: usize,
    runtime: Handle,
    workers: Workers,
}

impl RateLimitedQueueManager {
    #[must_use]
    pub fn builder() -> RateLimitedQueueManagerBuilder { RateLimitedQueueManagerBuilder::default() }

    /// Configured requests per second.
    #[must_use]
    pub fn rate(&self) -> usize { self.rate }

    /// Number of requests waiting for `owner`.
    #[must_use]
    pub fn queued(&self, owner: &SnacProcessor) -> usize {
        self.workers
            .get(&owner.id())
            .map_or(0, |worker| worker.queue.lock().len())
    }

    /// Number of processors this manager currently runs a worker for.
    ///
    /// A worker is released when its processor detaches the manager or is
    /// dropped.
    #[must_use]
    pub fn worker_count(&self) -> usize { self.workers.len() }

    fn limiter(&self) -> RateLimiter {
        RateLimiter::builder()
            .initial(self.rate)
            .refill(self.rate)
            .interval(Duration::from_secs(1))
            .max(self.rate)
            .build()
    }

    fn worker(&self, owner: &SnacProcessor) -> Option<Arc<Worker>> {
        self.workers.get(&owner.id()).map(|w| Arc::clone(w.value()))
    }
}

impl QueueManager for RateLimitedQueueManager {
    fn attached(&self, owner: &SnacProcessor) {
        let worker = Arc::new(Worker::new(owner));
        if let Some(previous) = self.workers.insert(owner.id(), Arc::clone(&worker)) {
            previous.shutdown.cancel();
        }
        self.runtime.spawn(worker.run(
            owner.downgrade(),
            self.limiter(),
            Arc::clone(&self.workers),
        ));
        debug!(processor = %owner.id(), rate = self.rate, "send worker started");
    }

    fn detached(&self, owner: &SnacProcessor) {
        if let Some((_, worker)) = self.workers.remove(&owner.id()) {
            worker.shutdown.cancel();
        }
    }

    fn queue_send(&self, owner: &SnacProcessor, request: SnacRequest) -> Result<(), SendError> {
        let Some(worker) = self.worker(owner) else {
            return owner.send_immediately(&request).map(|_| ());
        };
        worker.queue.lock().push_back(request);
        worker.wake.notify_one();
        Ok(())
    }

    fn pause(&self, owner: &SnacProcessor) {
        if let Some(worker) = self.worker(owner) {
            worker.paused.store(true, Ordering::Release);
        }
    }

    fn unpause(&self, owner: &SnacProcessor) {
        if let Some(worker) = self.worker(owner) {
            worker.paused.store(false, Ordering::Release);
            worker.wake.notify_one();
        }
    }

    fn clear_queue(&self, owner: &SnacProcessor) {
        if let Some(worker) = self.worker(owner) {
            worker.queue.lock().clear();
        }
    }
}
