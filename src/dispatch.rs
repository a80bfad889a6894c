//! Inbound dispatch pipeline.
//!
//! Each packet passes through five stages, serialised per processor:
//!
//! 1. preprocessors rewrite a mutable copy;
//! 2. the factory registry decodes the command;
//! 3. a packet whose request id matches an outstanding request is routed to
//!    the global response listeners and then the request's own listeners,
//!    and dispatch ends there;
//! 4. otherwise vetoable listeners run in order until one returns
//!    [`Dispatch::Stop`];
//! 5. if none did, every packet listener sees the packet.
//!
//! A failing listener is reported and skipped; it never aborts the pipeline.

use std::fmt;

use tracing::trace;

use crate::{
    event::{SnacPacketEvent, SnacResponseEvent},
    fault::{FaultKind, isolate},
    listener::Dispatch,
    metrics,
    packet::{MutableSnacPacket, SnacPacket},
    processor::SnacProcessor,
    reqid::RequestId,
};

/// How a packet left the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Routed as a response to the request with this id.
    Response(RequestId),
    /// A vetoable listener halted dispatch.
    Vetoed,
    /// Delivered to the packet listeners.
    Delivered,
}

impl DispatchOutcome {
    /// Label used for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Response(_) => "response",
            Self::Vetoed => "vetoed",
            Self::Delivered => "delivered",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl SnacProcessor {
    /// Run `packet` through the dispatch pipeline.
    ///
    /// Called by the transport listener for every SNAC frame; exposed so
    /// packets can be injected directly. Packets are dispatched one at a time
    /// in call order.
    pub fn process_packet(&self, packet: SnacPacket) -> DispatchOutcome {
        let _guard = self.inner.dispatch_lock.lock();
        let packet = self.preprocess(packet);
        let command = self.inner.factories.decode(&packet);
        let event = SnacPacketEvent::new(packet, command);

        let outcome = match self.inner.table.lookup(event.request_id()) {
            Some(request) => {
                let id = event.request_id();
                self.route_response(SnacResponseEvent::new(event, request));
                DispatchOutcome::Response(id)
            }
            None if self.veto(&event) => DispatchOutcome::Vetoed,
            None => {
                self.deliver(&event);
                DispatchOutcome::Delivered
            }
        };
        trace!(processor = %self.inner.id, %outcome, "dispatched SNAC packet");
        metrics::inc_packets_dispatched(outcome);
        outcome
    }

    fn preprocess(&self, packet: SnacPacket) -> SnacPacket {
        let preprocessors = self.inner.preprocessors.snapshot();
        if preprocessors.is_empty() {
            return packet;
        }
        let mut working = MutableSnacPacket::from(&packet);
        for preprocessor in preprocessors.iter() {
            if let Err(cause) = isolate(|| preprocessor.process(&mut working)) {
                self.report(FaultKind::Preprocessor, preprocessor.describe(), cause);
            }
        }
        if working.is_changed() {
            working.to_packet()
        } else {
            packet
        }
    }

    fn route_response(&self, event: SnacResponseEvent) {
        for listener in self.inner.response_listeners.snapshot().iter() {
            if let Err(cause) = isolate(|| listener.handle_response(&event)) {
                self.report(FaultKind::ResponseListener, listener.describe(), cause);
            }
        }
        for listener in event.request().listeners().iter() {
            if let Err(cause) = isolate(|| listener.handle_response(&event)) {
                self.report(FaultKind::RequestListener, listener.describe(), cause);
            }
        }
    }

    /// Returns `true` if a vetoable listener stopped dispatch.
    fn veto(&self, event: &SnacPacketEvent) -> bool {
        for listener in self.inner.vetoable_listeners.snapshot().iter() {
            match isolate(|| listener.handle_packet(event)) {
                Ok(Dispatch::Stop) => return true,
                Ok(Dispatch::Continue) => {}
                Err(cause) => self.report(FaultKind::PacketListener, listener.describe(), cause),
            }
        }
        false
    }

    fn deliver(&self, event: &SnacPacketEvent) {
        for listener in self.inner.packet_listeners.snapshot().iter() {
            if let Err(cause) = isolate(|| listener.handle_packet(event)) {
                self.report(FaultKind::PacketListener, listener.describe(), cause);
            }
        }
    }
}
