//! Events delivered to listeners.

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::{command::SnacCommand, packet::SnacPacket, reqid::RequestId, request::SnacRequest};

/// An inbound packet together with its decoded command.
///
/// `command` is `None` when no factory matched the packet's type or the
/// factory declined to decode it; such packets are still dispatched.
#[derive(Clone, Debug)]
pub struct SnacPacketEvent {
    packet: SnacPacket,
    command: Option<Arc<dyn SnacCommand>>,
}

impl SnacPacketEvent {
    #[must_use]
    pub fn new(packet: SnacPacket, command: Option<Arc<dyn SnacCommand>>) -> Self {
        Self { packet, command }
    }

    /// The packet after preprocessing.
    #[must_use]
    pub fn packet(&self) -> &SnacPacket { &self.packet }

    #[must_use]
    pub fn command(&self) -> Option<&Arc<dyn SnacCommand>> { self.command.as_ref() }

    #[must_use]
    pub fn request_id(&self) -> RequestId { self.packet.request_id() }
}

/// An inbound packet correlated with an outstanding request.
#[derive(Clone, Debug)]
pub struct SnacResponseEvent {
    packet: SnacPacketEvent,
    request: SnacRequest,
}

impl SnacResponseEvent {
    #[must_use]
    pub fn new(packet: SnacPacketEvent, request: SnacRequest) -> Self { Self { packet, request } }

    #[must_use]
    pub fn packet_event(&self) -> &SnacPacketEvent { &self.packet }

    #[must_use]
    pub fn packet(&self) -> &SnacPacket { self.packet.packet() }

    #[must_use]
    pub fn command(&self) -> Option<&Arc<dyn SnacCommand>> { self.packet.command() }

    /// The request this packet answers.
    #[must_use]
    pub fn request(&self) -> &SnacRequest { &self.request }
}

/// A request was handed to the transport.
#[derive(Clone, Debug)]
pub struct RequestSentEvent {
    request: SnacRequest,
    sent_at: Instant,
}

impl RequestSentEvent {
    #[must_use]
    pub fn new(request: SnacRequest, sent_at: Instant) -> Self { Self { request, sent_at } }

    #[must_use]
    pub fn request(&self) -> &SnacRequest { &self.request }

    #[must_use]
    pub fn sent_at(&self) -> Instant { self.sent_at }
}

/// A request stopped being eligible for correlation.
#[derive(Clone, Debug)]
pub struct RequestTimeoutEvent {
    request: SnacRequest,
    ttl: Duration,
}

impl RequestTimeoutEvent {
    #[must_use]
    pub fn new(request: SnacRequest, ttl: Duration) -> Self { Self { request, ttl } }

    #[must_use]
    pub fn request(&self) -> &SnacRequest { &self.request }

    /// Time-to-live in force when the request expired.
    #[must_use]
    pub fn ttl(&self) -> Duration { self.ttl }
}
