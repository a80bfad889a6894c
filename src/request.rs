//! Outgoing requests.
//!
//! A [`SnacRequest`] is a cheap, cloneable handle. Its identifier is assigned
//! on first registration and its send time when it is handed to the
//! transport; neither ever changes afterwards.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use bytes::BytesMut;
use tokio::time::Instant;

use crate::{
    command::SnacCommand,
    listener::{ListenerSet, SnacRequestListener},
    packet::SnacPacket,
    reqid::RequestId,
};

struct RequestInner {
    command: Arc<dyn SnacCommand>,
    id: OnceLock<RequestId>,
    sent_at: OnceLock<Instant>,
    listeners: ListenerSet<dyn SnacRequestListener>,
}

/// An outgoing unit of work and its listeners.
#[derive(Clone)]
pub struct SnacRequest(Arc<RequestInner>);

impl SnacRequest {
    /// Create an unregistered request for `command`.
    #[must_use]
    pub fn new(command: Arc<dyn SnacCommand>) -> Self {
        Self(Arc::new(RequestInner {
            command,
            id: OnceLock::new(),
            sent_at: OnceLock::new(),
            listeners: ListenerSet::new(),
        }))
    }

    /// Create a request for `command` with one listener attached.
    #[must_use]
    pub fn with_listener(
        command: Arc<dyn SnacCommand>,
        listener: Arc<dyn SnacRequestListener>,
    ) -> Self {
        let request = Self::new(command);
        request.add_listener(listener);
        request
    }

    #[must_use]
    pub fn command(&self) -> &Arc<dyn SnacCommand> { &self.0.command }

    /// Identifier assigned at registration, if registered.
    #[must_use]
    pub fn id(&self) -> Option<RequestId> { self.0.id.get().copied() }

    /// When the request was handed to the transport, if it has been.
    #[must_use]
    pub fn sent_at(&self) -> Option<Instant> { self.0.sent_at.get().copied() }

    #[must_use]
    pub fn is_sent(&self) -> bool { self.0.sent_at.get().is_some() }

    /// Attach `listener`; adding the same listener twice has no effect.
    pub fn add_listener(&self, listener: Arc<dyn SnacRequestListener>) -> bool {
        self.0.listeners.add(listener)
    }

    pub fn remove_listener(&self, listener: &Arc<dyn SnacRequestListener>) -> bool {
        self.0.listeners.remove(listener)
    }

    /// Whether `self` and `other` are handles to the same request.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.0, &other.0) }

    pub(crate) fn listeners(&self) -> Arc<[Arc<dyn SnacRequestListener>]> {
        self.0.listeners.snapshot()
    }

    /// Record `id`. Returns `false` if an id was already assigned.
    pub(crate) fn assign_id(&self, id: RequestId) -> bool { self.0.id.set(id).is_ok() }

    /// Record the send time. Returns `false` if already sent.
    pub(crate) fn record_sent(&self, at: Instant) -> bool { self.0.sent_at.set(at).is_ok() }

    /// Frame the command as a SNAC packet carrying `id`.
    pub(crate) fn to_packet(&self, id: RequestId) -> SnacPacket {
        let command = &self.0.command;
        let mut payload = BytesMut::new();
        command.write_payload(&mut payload);
        SnacPacket::new(
            command.family(),
            command.subtype(),
            command.flags(),
            id,
            payload.freeze(),
        )
    }
}

impl fmt::Debug for SnacRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnacRequest")
            .field("id", &self.id())
            .field("command", &self.0.command)
            .field("sent", &self.is_sent())
            .finish_non_exhaustive()
    }
}
