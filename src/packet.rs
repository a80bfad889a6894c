//! SNAC packet model.
//!
//! A [`SnacPacket`] is the unit the dispatch pipeline works on: a ten byte
//! header (family, subtype, flags, request id; all big-endian) followed by an
//! opaque payload. Packets arrive wrapped in a [`FlapPacket`] on
//! [`SNAC_CHANNEL`]; preprocessors see a [`MutableSnacPacket`] copy.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::reqid::RequestId;

/// FLAP channel carrying SNAC commands.
pub const SNAC_CHANNEL: u8 = 2;

/// Size of the SNAC header in bytes.
pub const SNAC_HEADER_LEN: usize = 10;

/// Errors raised while parsing a SNAC header.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// The body was shorter than a SNAC header.
    #[error("SNAC body too short: {len} bytes, need at least {SNAC_HEADER_LEN}")]
    Truncated {
        /// Number of bytes available.
        len: usize,
    },
}

/// A whole frame delivered by the FLAP transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlapPacket {
    channel: u8,
    body: Bytes,
}

impl FlapPacket {
    /// Create a frame for `channel` carrying `body`.
    #[must_use]
    pub fn new(channel: u8, body: impl Into<Bytes>) -> Self {
        Self {
            channel,
            body: body.into(),
        }
    }

    /// Wrap a SNAC packet for the SNAC channel.
    #[must_use]
    pub fn from_snac(packet: &SnacPacket) -> Self { Self::new(SNAC_CHANNEL, packet.to_bytes()) }

    #[must_use]
    pub fn channel(&self) -> u8 { self.channel }

    #[must_use]
    pub fn body(&self) -> &Bytes { &self.body }
}

/// Immutable SNAC packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnacPacket {
    family: u16,
    subtype: u16,
    flags: u16,
    request_id: RequestId,
    payload: Bytes,
}

impl SnacPacket {
    /// Assemble a packet from its parts.
    #[must_use]
    pub fn new(
        family: u16,
        subtype: u16,
        flags: u16,
        request_id: RequestId,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            family,
            subtype,
            flags,
            request_id,
            payload: payload.into(),
        }
    }

    /// Parse a packet from the body of a SNAC-channel FLAP frame.
    ///
    /// The payload shares the input buffer rather than copying it.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Truncated`] if `body` is shorter than the
    /// header.
    pub fn parse(body: &Bytes) -> Result<Self, PacketError> {
        if body.len() < SNAC_HEADER_LEN {
            return Err(PacketError::Truncated { len: body.len() });
        }
        let mut header = &body[..SNAC_HEADER_LEN];
        let family = header.get_u16();
        let subtype = header.get_u16();
        let flags = header.get_u16();
        let request_id = RequestId::new(header.get_u32());
        Ok(Self {
            family,
            subtype,
            flags,
            request_id,
            payload: body.slice(SNAC_HEADER_LEN..),
        })
    }

    /// Serialise header and payload into a contiguous buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(SNAC_HEADER_LEN + self.payload.len());
        out.put_u16(self.family);
        out.put_u16(self.subtype);
        out.put_u16(self.flags);
        out.put_u32(self.request_id.as_u32());
        out.put_slice(&self.payload);
        out.freeze()
    }

    #[must_use]
    pub fn family(&self) -> u16 { self.family }

    #[must_use]
    pub fn subtype(&self) -> u16 { self.subtype }

    #[must_use]
    pub fn flags(&self) -> u16 { self.flags }

    #[must_use]
    pub fn request_id(&self) -> RequestId { self.request_id }

    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }
}

/// Working copy of a [`SnacPacket`] handed to preprocessors.
///
/// Every setter marks the copy as changed, even when the new value equals the
/// old one. A changed copy replaces the original for the rest of dispatch.
#[derive(Clone, Debug)]
pub struct MutableSnacPacket {
    family: u16,
    subtype: u16,
    flags: u16,
    request_id: RequestId,
    payload: Bytes,
    changed: bool,
}

impl From<&SnacPacket> for MutableSnacPacket {
    fn from(packet: &SnacPacket) -> Self {
        Self {
            family: packet.family,
            subtype: packet.subtype,
            flags: packet.flags,
            request_id: packet.request_id,
            payload: packet.payload.clone(),
            changed: false,
        }
    }
}

impl MutableSnacPacket {
    #[must_use]
    pub fn family(&self) -> u16 { self.family }

    #[must_use]
    pub fn subtype(&self) -> u16 { self.subtype }

    #[must_use]
    pub fn flags(&self) -> u16 { self.flags }

    #[must_use]
    pub fn request_id(&self) -> RequestId { self.request_id }

    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    pub fn set_family(&mut self, family: u16) {
        self.family = family;
        self.changed = true;
    }

    pub fn set_subtype(&mut self, subtype: u16) {
        self.subtype = subtype;
        self.changed = true;
    }

    pub fn set_flags(&mut self, flags: u16) {
        self.flags = flags;
        self.changed = true;
    }

    pub fn set_request_id(&mut self, request_id: RequestId) {
        self.request_id = request_id;
        self.changed = true;
    }

    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
        self.changed = true;
    }

    /// Whether any setter has been called.
    #[must_use]
    pub fn is_changed(&self) -> bool { self.changed }

    /// Freeze the working copy into an immutable packet.
    #[must_use]
    pub fn to_packet(&self) -> SnacPacket {
        SnacPacket {
            family: self.family,
            subtype: self.subtype,
            flags: self.flags,
            request_id: self.request_id,
            payload: self.payload.clone(),
        }
    }
}
