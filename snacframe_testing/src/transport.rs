//! In-memory transport recording everything a processor does with it.

use std::sync::Arc;

use parking_lot::Mutex;
use snacframe::{
    Dispatch,
    FaultKind,
    FlapPacket,
    FlapPacketListener,
    FlapTransport,
    ListenerFault,
    SnacPacket,
};

/// A fault passed to [`FlapTransport::report_error`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedFault {
    pub kind: FaultKind,
    pub context: String,
    pub message: String,
    pub panicked: bool,
}

/// Transport that records sent packets and reported faults, and lets tests
/// push inbound frames through its vetoable listeners.
#[derive(Default)]
pub struct MockTransport {
    listeners: Mutex<Vec<Arc<dyn FlapPacketListener>>>,
    sent: Mutex<Vec<SnacPacket>>,
    faults: Mutex<Vec<RecordedFault>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    /// Offer `frame` to each listener in turn until one claims it.
    ///
    /// Returns `true` if a listener returned [`Dispatch::Stop`].
    pub fn deliver(&self, frame: &FlapPacket) -> bool {
        let listeners = self.listeners.lock().clone();
        listeners
            .iter()
            .any(|listener| listener.handle_flap(frame) == Dispatch::Stop)
    }

    /// Deliver `packet` wrapped in a SNAC-channel frame.
    pub fn deliver_snac(&self, packet: &SnacPacket) -> bool {
        self.deliver(&FlapPacket::from_snac(packet))
    }

    /// Packets sent so far, in send order.
    #[must_use]
    pub fn sent(&self) -> Vec<SnacPacket> { self.sent.lock().clone() }

    /// Remove and return the packets sent so far.
    pub fn take_sent(&self) -> Vec<SnacPacket> { std::mem::take(&mut *self.sent.lock()) }

    /// Faults reported so far.
    #[must_use]
    pub fn faults(&self) -> Vec<RecordedFault> { self.faults.lock().clone() }

    /// Number of vetoable listeners currently registered.
    #[must_use]
    pub fn listener_count(&self) -> usize { self.listeners.lock().len() }
}

impl FlapTransport for MockTransport {
    fn add_vetoable_listener(&self, listener: Arc<dyn FlapPacketListener>) {
        self.listeners.lock().push(listener);
    }

    fn remove_vetoable_listener(&self, listener: &Arc<dyn FlapPacketListener>) {
        self.listeners.lock().retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn send_snac(&self, packet: SnacPacket) { self.sent.lock().push(packet); }

    fn report_error(&self, fault: &ListenerFault) {
        self.faults.lock().push(RecordedFault {
            kind: fault.kind(),
            context: fault.context().to_owned(),
            message: fault.cause().to_string(),
            panicked: fault.is_panic(),
        });
    }
}
