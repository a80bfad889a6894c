//! Packet and request builders.

use std::sync::Arc;

use snacframe::{RawCommand, RequestId, SnacPacket, SnacRequest};

/// A fresh request carrying an empty [`RawCommand`].
#[must_use]
pub fn raw_request(family: u16, subtype: u16) -> SnacRequest {
    SnacRequest::new(Arc::new(RawCommand::new(family, subtype, Vec::new())))
}

/// A response to `sent`: same family and request id, next subtype.
#[must_use]
pub fn reply_to(sent: &SnacPacket) -> SnacPacket {
    SnacPacket::new(
        sent.family(),
        sent.subtype().wrapping_add(1),
        0,
        sent.request_id(),
        Vec::new(),
    )
}

/// A packet not tied to any outstanding request.
#[must_use]
pub fn unsolicited(family: u16, subtype: u16, request_id: u32) -> SnacPacket {
    SnacPacket::new(family, subtype, 0, RequestId::new(request_id), Vec::new())
}
