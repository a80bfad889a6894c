//! The SNAC processor.
//!
//! [`SnacProcessor`] ties the request table, factory registry, listener sets
//! and queue manager together and binds them to a [`FlapTransport`].
//!
//! Locking: inbound dispatch is serialised by a dispatch lock, the request
//! table has its own lock, and sent/timeout notifications are serialised by a
//! request-event lock, so inbound dispatch never waits behind outbound
//! notification fan-out or the other way round. Lifecycle operations
//! (attach, detach, migrate, pause, manager swaps) are serialised by a fourth
//! lock. The dispatch, request-event and lifecycle locks are re-entrant so a
//! listener or queue manager may call back into its processor.
//!
//! Listener callbacks run synchronously on the thread performing the dispatch
//! or notification; a listener that blocks stalls that processor.
//!
//! `detach` holds the lifecycle lock while it fires timeout notifications
//! under the request-event lock, whereas a sent or timeout listener runs with
//! the request-event lock held. A listener that calls `attach`, `detach`,
//! `migrate`, `pause`, `unpause` or swaps the queue manager can therefore
//! deadlock against a concurrent `detach` on another thread, each holding the
//! lock the other needs. Such calls are safe on the thread already running
//! `detach`, since both locks are re-entrant.

mod builder;
mod lifecycle;

use std::{
    fmt,
    sync::{
        Arc,
        Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

pub use builder::SnacProcessorBuilder;
use parking_lot::{ReentrantMutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    error::SendError,
    event::{RequestSentEvent, RequestTimeoutEvent},
    factory::CommandFactoryRegistry,
    fault::{FaultCause, FaultKind, ListenerFault, isolate},
    listener::{
        ListenerSet,
        OutgoingRequestListener,
        PacketListener,
        ResponseListener,
        SnacPreprocessor,
        VetoablePacketListener,
    },
    metrics,
    queue::QueueManager,
    reqid::RequestId,
    request::SnacRequest,
    table::RequestTable,
    transport::{FlapPacketListener, FlapTransport},
};

static NEXT_PROCESSOR_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a [`SnacProcessor`].
///
/// Queue managers serving several processors key their state by it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProcessorId(u64);

impl ProcessorId {
    fn next() -> Self { Self(NEXT_PROCESSOR_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessorId({})", self.0)
    }
}

struct ProcessorState {
    transport: Option<Arc<dyn FlapTransport>>,
    paused: bool,
    queue_manager: Arc<dyn QueueManager>,
}

pub(crate) struct ProcessorInner {
    pub(crate) id: ProcessorId,
    pub(crate) factories: CommandFactoryRegistry,
    pub(crate) table: RequestTable,
    pub(crate) dispatch_lock: ReentrantMutex<()>,
    request_event_lock: ReentrantMutex<()>,
    lifecycle_lock: ReentrantMutex<()>,
    state: RwLock<ProcessorState>,
    interceptor: Arc<dyn FlapPacketListener>,
    pub(crate) preprocessors: ListenerSet<dyn SnacPreprocessor>,
    pub(crate) vetoable_listeners: ListenerSet<dyn VetoablePacketListener>,
    pub(crate) packet_listeners: ListenerSet<dyn PacketListener>,
    request_listeners: ListenerSet<dyn OutgoingRequestListener>,
    pub(crate) response_listeners: ListenerSet<dyn ResponseListener>,
    closed: CancellationToken,
}

impl Drop for ProcessorInner {
    fn drop(&mut self) { self.closed.cancel(); }
}

/// Correlates outgoing SNAC requests with their responses and fans out
/// unsolicited packets to listeners.
///
/// Cloning yields another handle to the same processor.
#[derive(Clone)]
pub struct SnacProcessor {
    pub(crate) inner: Arc<ProcessorInner>,
}

/// Non-owning handle to a [`SnacProcessor`].
#[derive(Clone, Debug)]
pub struct WeakSnacProcessor(Weak<ProcessorInner>);

impl WeakSnacProcessor {
    /// Recover a strong handle if the processor is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<SnacProcessor> {
        self.0.upgrade().map(|inner| SnacProcessor { inner })
    }
}

impl fmt::Debug for SnacProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnacProcessor")
            .field("id", &self.inner.id)
            .field("attached", &self.is_attached())
            .field("paused", &self.is_paused())
            .field("outstanding", &self.outstanding_requests())
            .finish_non_exhaustive()
    }
}

impl Default for SnacProcessor {
    fn default() -> Self { Self::builder().build() }
}

impl SnacProcessor {
    /// Create a detached processor with default settings.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Start configuring a processor.
    #[must_use]
    pub fn builder() -> SnacProcessorBuilder { SnacProcessorBuilder::default() }

    #[must_use]
    pub fn id(&self) -> ProcessorId { self.inner.id }

    /// Downgrade to a handle that does not keep the processor alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakSnacProcessor { WeakSnacProcessor(Arc::downgrade(&self.inner)) }

    /// A token cancelled once every handle to this processor has been dropped.
    ///
    /// Queue managers keeping per-processor state use it to release that
    /// state when the processor goes away without being detached from them.
    /// Cancelling the returned token has no effect on the processor.
    #[must_use]
    pub fn closed(&self) -> CancellationToken { self.inner.closed.child_token() }

    /// This processor's command factory registry.
    #[must_use]
    pub fn factories(&self) -> &CommandFactoryRegistry { &self.inner.factories }

    /// The transport currently attached, if any.
    #[must_use]
    pub fn transport(&self) -> Option<Arc<dyn FlapTransport>> {
        self.inner.state.read().transport.clone()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool { self.inner.state.read().transport.is_some() }

    #[must_use]
    pub fn is_paused(&self) -> bool { self.inner.state.read().paused }

    /// The active queue manager.
    #[must_use]
    pub fn queue_manager(&self) -> Arc<dyn QueueManager> {
        Arc::clone(&self.inner.state.read().queue_manager)
    }

    /// Time-to-live applied to sent requests.
    #[must_use]
    pub fn request_ttl(&self) -> Duration { self.inner.table.ttl() }

    /// Change the time-to-live for sent requests.
    ///
    /// With a zero TTL request ids are never retained for correlation: a
    /// request is dropped from the table once sent and timed out at the next
    /// registration. Lowering the TTL to zero expires every outstanding
    /// request, sent or not, at the next registration.
    pub fn set_request_ttl(&self, ttl: Duration) {
        debug!(processor = %self.inner.id, ?ttl, "request TTL changed");
        self.inner.table.set_ttl(ttl);
    }

    /// Number of registered requests still eligible for correlation.
    #[must_use]
    pub fn outstanding_requests(&self) -> usize { self.inner.table.len() }

    pub fn add_preprocessor(&self, preprocessor: Arc<dyn SnacPreprocessor>) -> bool {
        self.inner.preprocessors.add(preprocessor)
    }

    pub fn remove_preprocessor(&self, preprocessor: &Arc<dyn SnacPreprocessor>) -> bool {
        self.inner.preprocessors.remove(preprocessor)
    }

    pub fn add_vetoable_packet_listener(&self, listener: Arc<dyn VetoablePacketListener>) -> bool {
        self.inner.vetoable_listeners.add(listener)
    }

    pub fn remove_vetoable_packet_listener(
        &self,
        listener: &Arc<dyn VetoablePacketListener>,
    ) -> bool {
        self.inner.vetoable_listeners.remove(listener)
    }

    pub fn add_packet_listener(&self, listener: Arc<dyn PacketListener>) -> bool {
        self.inner.packet_listeners.add(listener)
    }

    pub fn remove_packet_listener(&self, listener: &Arc<dyn PacketListener>) -> bool {
        self.inner.packet_listeners.remove(listener)
    }

    pub fn add_global_request_listener(&self, listener: Arc<dyn OutgoingRequestListener>) -> bool {
        self.inner.request_listeners.add(listener)
    }

    pub fn remove_global_request_listener(
        &self,
        listener: &Arc<dyn OutgoingRequestListener>,
    ) -> bool {
        self.inner.request_listeners.remove(listener)
    }

    pub fn add_global_response_listener(&self, listener: Arc<dyn ResponseListener>) -> bool {
        self.inner.response_listeners.add(listener)
    }

    pub fn remove_global_response_listener(&self, listener: &Arc<dyn ResponseListener>) -> bool {
        self.inner.response_listeners.remove(listener)
    }

    /// Register `request` and hand it to the queue manager, which may defer
    /// the actual send.
    ///
    /// Returns the request's identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::RequestRetired`] or [`SendError::AlreadySent`] for a
    /// request registered earlier whose entry is gone, and whatever the queue
    /// manager returns for a synchronous send, such as [`SendError::Detached`]
    /// or [`SendError::AlreadySent`].
    pub fn send(&self, request: &SnacRequest) -> Result<RequestId, SendError> {
        let id = self.register(request)?;
        debug!(processor = %self.inner.id, %id, command = ?request.command(), "queueing SNAC request");
        self.queue_manager().queue_send(self, request.clone())?;
        Ok(id)
    }

    /// Register `request` and send it now, bypassing the queue manager and
    /// the pause state.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Detached`] without registering the request if no
    /// transport is attached, and [`SendError::AlreadySent`] if the request
    /// was sent before.
    pub fn send_immediately(&self, request: &SnacRequest) -> Result<RequestId, SendError> {
        let transport = self.transport().ok_or(SendError::Detached)?;
        let id = self.register(request)?;
        let sent_at = self.inner.table.mark_sent(request, Instant::now())?;
        debug!(processor = %self.inner.id, %id, "sending SNAC request");
        transport.send_snac(request.to_packet(id));
        metrics::inc_requests_sent();
        self.fire_sent(request, sent_at);
        Ok(id)
    }

    fn register(&self, request: &SnacRequest) -> Result<RequestId, SendError> {
        let registration = self.inner.table.register(request, Instant::now())?;
        self.fire_timeouts(registration.expired);
        Ok(registration.id)
    }

    fn fire_sent(&self, request: &SnacRequest, sent_at: Instant) {
        let event = RequestSentEvent::new(request.clone(), sent_at);
        let _guard = self.inner.request_event_lock.lock();
        for listener in self.inner.request_listeners.snapshot().iter() {
            if let Err(cause) = isolate(|| listener.handle_sent(&event)) {
                self.report(FaultKind::RequestListener, listener.describe(), cause);
            }
        }
        for listener in request.listeners().iter() {
            if let Err(cause) = isolate(|| listener.handle_sent(&event)) {
                self.report(FaultKind::RequestListener, listener.describe(), cause);
            }
        }
    }

    /// Notify listeners that `expired` requests timed out.
    ///
    /// Must not be called with the table lock held.
    pub(crate) fn fire_timeouts(&self, expired: Vec<SnacRequest>) {
        if expired.is_empty() {
            return;
        }
        let ttl = self.request_ttl();
        let _guard = self.inner.request_event_lock.lock();
        let global = self.inner.request_listeners.snapshot();
        for request in expired {
            trace!(processor = %self.inner.id, id = ?request.id(), "request timed out");
            metrics::inc_requests_timed_out();
            let event = RequestTimeoutEvent::new(request.clone(), ttl);
            for listener in global.iter() {
                if let Err(cause) = isolate(|| listener.handle_timeout(&event)) {
                    self.report(FaultKind::RequestListener, listener.describe(), cause);
                }
            }
            for listener in request.listeners().iter() {
                if let Err(cause) = isolate(|| listener.handle_timeout(&event)) {
                    self.report(FaultKind::RequestListener, listener.describe(), cause);
                }
            }
        }
    }

    /// Log an isolated failure and pass it to the transport's error sink.
    pub(crate) fn report(&self, kind: FaultKind, context: String, cause: FaultCause) {
        let fault = ListenerFault::new(kind, context, cause);
        warn!(
            processor = %self.inner.id,
            kind = %fault.kind(),
            context = fault.context(),
            error = %fault.cause(),
            "listener fault"
        );
        metrics::inc_listener_faults(kind);
        if let Some(transport) = self.transport() {
            transport.report_error(&fault);
        }
    }
}
