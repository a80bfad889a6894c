//! Builder for configuring a [`SnacProcessor`].

use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::{ReentrantMutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::{
    ProcessorId,
    ProcessorInner,
    ProcessorState,
    SnacProcessor,
    WeakSnacProcessor,
    lifecycle::SnacInterceptor,
};
use crate::{
    config::ProcessorConfig,
    factory::CommandFactoryRegistry,
    listener::ListenerSet,
    queue::{ImmediateQueueManager, QueueManager},
    reqid::RequestIdAllocator,
    table::{DEFAULT_REQUEST_TTL, RequestTable},
    transport::FlapTransport,
};

/// Builder for [`SnacProcessor`].
///
/// Defaults: a request TTL of [`DEFAULT_REQUEST_TTL`], the
/// [`ImmediateQueueManager`], no fallback factory registry, client-range
/// request ids starting at 1, and no transport.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use snacframe::{PausableQueueManager, SnacProcessor};
///
/// let processor = SnacProcessor::builder()
///     .request_ttl(Duration::from_secs(30))
///     .queue_manager(std::sync::Arc::new(PausableQueueManager::new()))
///     .build();
/// assert_eq!(processor.request_ttl(), Duration::from_secs(30));
/// assert!(!processor.is_attached());
/// ```
pub struct SnacProcessorBuilder {
    request_ttl: Duration,
    request_ids: Option<RequestIdAllocator>,
    queue_manager: Option<Arc<dyn QueueManager>>,
    fallback_factories: Option<Arc<CommandFactoryRegistry>>,
    transport: Option<Arc<dyn FlapTransport>>,
}

impl Default for SnacProcessorBuilder {
    fn default() -> Self {
        Self {
            request_ttl: DEFAULT_REQUEST_TTL,
            request_ids: None,
            queue_manager: None,
            fallback_factories: None,
            transport: None,
        }
    }
}

impl fmt::Debug for SnacProcessorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnacProcessorBuilder")
            .field("request_ttl", &self.request_ttl)
            .field("request_ids", &self.request_ids)
            .field("queue_manager", &self.queue_manager.is_some())
            .field("fallback_factories", &self.fallback_factories)
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

impl SnacProcessorBuilder {
    /// Apply the settings in `config`.
    #[must_use]
    pub fn config(mut self, config: &ProcessorConfig) -> Self {
        self.request_ttl = config.request_ttl();
        if let Some(first) = config.first_request_id {
            self.request_ids = Some(RequestIdAllocator::starting_at(first));
        }
        self
    }

    /// Set how long sent requests stay eligible for correlation.
    #[must_use]
    pub fn request_ttl(mut self, ttl: Duration) -> Self {
        self.request_ttl = ttl;
        self
    }

    /// Use `ids` to allocate request identifiers.
    #[must_use]
    pub fn request_ids(mut self, ids: RequestIdAllocator) -> Self {
        self.request_ids = Some(ids);
        self
    }

    /// Install `manager` as the initial queue manager.
    #[must_use]
    pub fn queue_manager(mut self, manager: Arc<dyn QueueManager>) -> Self {
        self.queue_manager = Some(manager);
        self
    }

    /// Consult `registry` when this processor's own registry has no factory.
    #[must_use]
    pub fn fallback_factories(mut self, registry: Arc<CommandFactoryRegistry>) -> Self {
        self.fallback_factories = Some(registry);
        self
    }

    /// Attach to `transport` once built.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn FlapTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the processor.
    ///
    /// The queue manager receives its `attached` hook before this returns.
    #[must_use]
    pub fn build(self) -> SnacProcessor {
        let factories = match self.fallback_factories {
            Some(fallback) => CommandFactoryRegistry::with_fallback(fallback),
            None => CommandFactoryRegistry::new(),
        };
        let table = RequestTable::with_allocator(self.request_ttl, self.request_ids.unwrap_or_default());
        let queue_manager = self
            .queue_manager
            .unwrap_or_else(|| Arc::new(ImmediateQueueManager));

        let inner = Arc::new_cyclic(|weak: &Weak<ProcessorInner>| ProcessorInner {
            id: ProcessorId::next(),
            factories,
            table,
            dispatch_lock: ReentrantMutex::new(()),
            request_event_lock: ReentrantMutex::new(()),
            lifecycle_lock: ReentrantMutex::new(()),
            state: RwLock::new(ProcessorState {
                transport: None,
                paused: false,
                queue_manager: Arc::clone(&queue_manager),
            }),
            interceptor: Arc::new(SnacInterceptor::new(WeakSnacProcessor(weak.clone()))),
            preprocessors: ListenerSet::new(),
            vetoable_listeners: ListenerSet::new(),
            packet_listeners: ListenerSet::new(),
            request_listeners: ListenerSet::new(),
            response_listeners: ListenerSet::new(),
            closed: CancellationToken::new(),
        });
        let processor = SnacProcessor { inner };
        queue_manager.attached(&processor);
        if let Some(transport) = self.transport {
            processor.attach(transport);
        }
        processor
    }
}
