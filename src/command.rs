//! Decoded SNAC commands.
//!
//! Payload encoding and decoding belong to the command implementations; this
//! crate only needs a command's type code to frame it and a way to write its
//! payload.

use std::{any::Any, fmt};

use bytes::BytesMut;

/// A decoded or outgoing SNAC command.
///
/// Implementations are plain domain types. Use
/// [`downcast_ref`](trait.SnacCommand.html#method.downcast_ref) on a
/// `dyn SnacCommand` to recover the concrete type.
pub trait SnacCommand: Any + fmt::Debug + Send + Sync {
    /// Family code of this command.
    fn family(&self) -> u16;

    /// Subtype code within the family.
    fn subtype(&self) -> u16;

    /// SNAC header flags to send with this command.
    fn flags(&self) -> u16 { 0 }

    /// Append the command payload to `dst`.
    fn write_payload(&self, dst: &mut BytesMut);
}

impl dyn SnacCommand {
    /// Attempt to view this command as the concrete type `T`.
    #[must_use]
    pub fn downcast_ref<T: SnacCommand>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }

    /// Whether this command is of concrete type `T`.
    #[must_use]
    pub fn is<T: SnacCommand>(&self) -> bool { (self as &dyn Any).is::<T>() }
}

/// A command whose payload is carried verbatim.
///
/// Useful for pass-through forwarding and for tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawCommand {
    family: u16,
    subtype: u16,
    flags: u16,
    payload: bytes::Bytes,
}

impl RawCommand {
    #[must_use]
    pub fn new(family: u16, subtype: u16, payload: impl Into<bytes::Bytes>) -> Self {
        Self {
            family,
            subtype,
            flags: 0,
            payload: payload.into(),
        }
    }

    /// Set the header flags sent with this command.
    #[must_use]
    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn payload(&self) -> &bytes::Bytes { &self.payload }
}

impl SnacCommand for RawCommand {
    fn family(&self) -> u16 { self.family }

    fn subtype(&self) -> u16 { self.subtype }

    fn flags(&self) -> u16 { self.flags }

    fn write_payload(&self, dst: &mut BytesMut) { dst.extend_from_slice(&self.payload); }
}
