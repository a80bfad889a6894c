//! Boundary to the FLAP transport.
//!
//! The transport owns framing, sockets and its own error channel. A processor
//! attached to it registers exactly one [`FlapPacketListener`], which claims
//! every SNAC-channel frame and stops its propagation to other listeners.

use std::sync::Arc;

use crate::{
    fault::ListenerFault,
    listener::Dispatch,
    packet::{FlapPacket, SnacPacket},
};

/// Veto-capable listener registered with a transport.
pub trait FlapPacketListener: Send + Sync {
    /// Handle an inbound frame; [`Dispatch::Stop`] claims it.
    fn handle_flap(&self, packet: &FlapPacket) -> Dispatch;
}

/// Operations a processor needs from the transport beneath it.
///
/// Implementations must deliver inbound frames in arrival order.
pub trait FlapTransport: Send + Sync {
    /// Register a vetoable listener for inbound frames.
    fn add_vetoable_listener(&self, listener: Arc<dyn FlapPacketListener>);

    /// Remove a listener previously added with
    /// [`add_vetoable_listener`](Self::add_vetoable_listener).
    fn remove_vetoable_listener(&self, listener: &Arc<dyn FlapPacketListener>);

    /// Frame and send `packet` on the SNAC channel.
    ///
    /// Delivery failures are the transport's concern and are reported through
    /// its own error channel.
    fn send_snac(&self, packet: SnacPacket);

    /// Error sink for failures isolated during dispatch and notification.
    fn report_error(&self, fault: &ListenerFault);
}
