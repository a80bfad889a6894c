//! Binding to a transport, pausing, and swapping queue managers.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{SnacProcessor, WeakSnacProcessor};
use crate::{
    listener::Dispatch,
    packet::{FlapPacket, SNAC_CHANNEL, SnacPacket},
    queue::{ImmediateQueueManager, QueueManager},
    transport::{FlapPacketListener, FlapTransport},
};

/// Claims SNAC frames from the transport and feeds them to the processor.
#[derive(Debug)]
pub(super) struct SnacInterceptor {
    owner: WeakSnacProcessor,
}

impl SnacInterceptor {
    pub(super) fn new(owner: WeakSnacProcessor) -> Self { Self { owner } }
}

impl FlapPacketListener for SnacInterceptor {
    fn handle_flap(&self, packet: &FlapPacket) -> Dispatch {
        if packet.channel() != SNAC_CHANNEL {
            return Dispatch::Continue;
        }
        let Some(processor) = self.owner.upgrade() else {
            return Dispatch::Continue;
        };
        match SnacPacket::parse(packet.body()) {
            Ok(snac) => {
                processor.process_packet(snac);
            }
            Err(e) => {
                warn!(processor = %processor.id(), error = %e, "discarding malformed SNAC frame");
            }
        }
        Dispatch::Stop
    }
}

impl SnacProcessor {
    /// Bind to `transport`, first detaching from any current transport.
    ///
    /// Detaching times out every outstanding request, so `attach` always
    /// starts from a clean slate. Use [`migrate`](Self::migrate) to keep them.
    pub fn attach(&self, transport: Arc<dyn FlapTransport>) {
        let _guard = self.inner.lifecycle_lock.lock();
        self.detach();
        self.bind(transport);
        info!(processor = %self.inner.id, "attached to transport");
    }

    /// Unbind from the current transport and reset.
    ///
    /// Every outstanding request is timed out exactly once, the processor is
    /// unpaused, and the queue manager drops anything it holds. Responses
    /// arriving afterwards for the old ids are dispatched as unsolicited
    /// packets. Does nothing beyond the reset when no transport is attached.
    pub fn detach(&self) {
        let _guard = self.inner.lifecycle_lock.lock();
        let transport = self.transport();
        if let Some(transport) = &transport {
            transport.remove_vetoable_listener(&self.inner.interceptor);
        }

        let cancelled = self.inner.table.clear_all();
        if !cancelled.is_empty() {
            debug!(processor = %self.inner.id, count = cancelled.len(), "timing out requests on detach");
        }
        self.fire_timeouts(cancelled);

        let (manager, was_paused) = {
            let mut state = self.inner.state.write();
            state.transport = None;
            let was_paused = std::mem::replace(&mut state.paused, false);
            (Arc::clone(&state.queue_manager), was_paused)
        };
        manager.clear_queue(self);
        if was_paused {
            manager.unpause(self);
        }
        if transport.is_some() {
            info!(processor = %self.inner.id, "detached from transport");
        }
    }

    /// Rebind to `transport` without resetting.
    ///
    /// Outstanding requests keep their ids and remain eligible for
    /// correlation; the pause state and queue contents are untouched.
    pub fn migrate(&self, transport: Arc<dyn FlapTransport>) {
        let _guard = self.inner.lifecycle_lock.lock();
        if let Some(old) = self.transport() {
            old.remove_vetoable_listener(&self.inner.interceptor);
        }
        self.bind(transport);
        info!(
            processor = %self.inner.id,
            outstanding = self.outstanding_requests(),
            "migrated to new transport"
        );
    }

    fn bind(&self, transport: Arc<dyn FlapTransport>) {
        transport.add_vetoable_listener(Arc::clone(&self.inner.interceptor));
        self.inner.state.write().transport = Some(transport);
    }

    /// Pause sending. Repeat calls are ignored.
    pub fn pause(&self) {
        let _guard = self.inner.lifecycle_lock.lock();
        let manager = {
            let mut state = self.inner.state.write();
            if state.paused {
                return;
            }
            state.paused = true;
            Arc::clone(&state.queue_manager)
        };
        debug!(processor = %self.inner.id, "paused");
        manager.pause(self);
    }

    /// Resume sending. Repeat calls are ignored.
    pub fn unpause(&self) {
        let _guard = self.inner.lifecycle_lock.lock();
        let manager = {
            let mut state = self.inner.state.write();
            if !state.paused {
                return;
            }
            state.paused = false;
            Arc::clone(&state.queue_manager)
        };
        debug!(processor = %self.inner.id, "unpaused");
        manager.unpause(self);
    }

    /// Replace the active queue manager; `None` restores the default
    /// immediate policy.
    ///
    /// The old manager has its queue cleared and is told it was detached;
    /// the new one is told it was attached and is paused if the processor
    /// is paused.
    pub fn set_queue_manager(&self, manager: Option<Arc<dyn QueueManager>>) {
        let _guard = self.inner.lifecycle_lock.lock();
        let new = manager.unwrap_or_else(|| Arc::new(ImmediateQueueManager));
        let (old, paused) = {
            let mut state = self.inner.state.write();
            if Arc::ptr_eq(&state.queue_manager, &new) {
                return;
            }
            let old = std::mem::replace(&mut state.queue_manager, Arc::clone(&new));
            (old, state.paused)
        };
        old.clear_queue(self);
        old.detached(self);
        new.attached(self);
        if paused {
            new.pause(self);
        }
        debug!(processor = %self.inner.id, "queue manager replaced");
    }

    /// Restore the default policy if `manager` is the active manager.
    ///
    /// Returns `true` if the manager was replaced.
    pub fn unset_queue_manager(&self, manager: &Arc<dyn QueueManager>) -> bool {
        let _guard = self.inner.lifecycle_lock.lock();
        if !Arc::ptr_eq(&self.queue_manager(), manager) {
            return false;
        }
        self.set_queue_manager(None);
        true
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use rstest::rstest;
    use tracing_test::traced_test;

    use super::*;
    use crate::{fault::ListenerFault, reqid::RequestId};

    #[derive(Default)]
    struct Sink {
        listeners: Mutex<Vec<Arc<dyn FlapPacketListener>>>,
        sent: Mutex<Vec<SnacPacket>>,
    }

    impl FlapTransport for Sink {
        fn add_vetoable_listener(&self, listener: Arc<dyn FlapPacketListener>) {
            self.listeners.lock().push(listener);
        }

        fn remove_vetoable_listener(&self, listener: &Arc<dyn FlapPacketListener>) {
            self.listeners.lock().retain(|l| !Arc::ptr_eq(l, listener));
        }

        fn send_snac(&self, packet: SnacPacket) { self.sent.lock().push(packet); }

        fn report_error(&self, _fault: &ListenerFault) {}
    }

    fn interceptor(processor: &SnacProcessor) -> SnacInterceptor {
        SnacInterceptor::new(processor.downgrade())
    }

    #[rstest]
    #[case(1)]
    #[case(4)]
    #[case(5)]
    fn ignores_non_snac_channels(#[case] channel: u8) {
        let processor = SnacProcessor::new();
        let frame = FlapPacket::new(channel, vec![0u8; 12]);
        assert_eq!(interceptor(&processor).handle_flap(&frame), Dispatch::Continue);
    }

    #[test]
    fn claims_snac_frames() {
        let processor = SnacProcessor::new();
        let packet = SnacPacket::new(1, 2, 0, RequestId::new(3), Vec::new());
        let frame = FlapPacket::from_snac(&packet);
        assert_eq!(interceptor(&processor).handle_flap(&frame), Dispatch::Stop);
    }

    #[test]
    fn releases_frames_once_processor_is_gone() {
        let processor = SnacProcessor::new();
        let listener = interceptor(&processor);
        drop(processor);
        let frame = FlapPacket::from_snac(&SnacPacket::new(1, 2, 0, RequestId::new(3), Vec::new()));
        assert_eq!(listener.handle_flap(&frame), Dispatch::Continue);
    }

    #[test]
    #[traced_test]
    fn truncated_frame_is_logged() {
        let processor = SnacProcessor::new();
        let frame = FlapPacket::new(SNAC_CHANNEL, vec![0u8; 3]);
        assert_eq!(interceptor(&processor).handle_flap(&frame), Dispatch::Stop);
        assert!(logs_contain("discarding malformed SNAC frame"));
    }

    #[test]
    #[traced_test]
    fn attach_and_detach_are_logged() {
        let processor = SnacProcessor::new();
        let sink = Arc::new(Sink::default());
        processor.attach(sink.clone());
        assert_eq!(sink.listeners.lock().len(), 1);
        processor.detach();
        assert!(sink.listeners.lock().is_empty());
        assert!(logs_contain("attached to transport"));
        assert!(logs_contain("detached from transport"));
    }

    #[test]
    fn rebinding_to_the_same_transport_keeps_one_listener() {
        let processor = SnacProcessor::new();
        let sink = Arc::new(Sink::default());
        processor.attach(sink.clone());
        processor.attach(sink.clone());
        processor.migrate(sink.clone());
        assert_eq!(sink.listeners.lock().len(), 1);
        assert!(sink.sent.lock().is_empty());
    }
}
