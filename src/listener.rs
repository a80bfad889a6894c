//! Listener traits and copy-on-write listener sets.
//!
//! Each fan-out pass iterates a snapshot taken when the pass starts, so
//! listeners may add or remove listeners (including themselves) while being
//! called without skipping, duplicating or failing any callback.

use std::{any::type_name, sync::Arc};

use parking_lot::RwLock;

use crate::{
    event::{RequestSentEvent, RequestTimeoutEvent, SnacPacketEvent, SnacResponseEvent},
    fault::ListenerResult,
    packet::MutableSnacPacket,
};

/// Verdict returned by vetoable listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Let later listeners see the packet.
    Continue,
    /// Halt dispatch of this packet.
    Stop,
}

/// First pipeline stage; may rewrite the packet before decoding.
pub trait SnacPreprocessor: Send + Sync {
    /// Inspect or modify `packet`.
    fn process(&self, packet: &mut MutableSnacPacket) -> ListenerResult;

    /// Name used when reporting failures.
    fn describe(&self) -> String { type_name::<Self>().to_owned() }
}

/// Listener able to halt further dispatch of an unsolicited packet.
pub trait VetoablePacketListener: Send + Sync {
    /// Handle `event` and decide whether dispatch continues.
    fn handle_packet(&self, event: &SnacPacketEvent) -> ListenerResult<Dispatch>;

    /// Name used when reporting failures.
    fn describe(&self) -> String { type_name::<Self>().to_owned() }
}

/// Listener for unsolicited packets that no vetoable listener stopped.
pub trait PacketListener: Send + Sync {
    fn handle_packet(&self, event: &SnacPacketEvent) -> ListenerResult;

    /// Name used when reporting failures.
    fn describe(&self) -> String { type_name::<Self>().to_owned() }
}

/// Global listener for responses to any outstanding request.
pub trait ResponseListener: Send + Sync {
    fn handle_response(&self, event: &SnacResponseEvent) -> ListenerResult;

    /// Name used when reporting failures.
    fn describe(&self) -> String { type_name::<Self>().to_owned() }
}

/// Global listener for outgoing requests being sent or timing out.
pub trait OutgoingRequestListener: Send + Sync {
    fn handle_sent(&self, _event: &RequestSentEvent) -> ListenerResult { Ok(()) }

    fn handle_timeout(&self, _event: &RequestTimeoutEvent) -> ListenerResult { Ok(()) }

    /// Name used when reporting failures.
    fn describe(&self) -> String { type_name::<Self>().to_owned() }
}

/// Listener attached to a single [`SnacRequest`](crate::SnacRequest).
pub trait SnacRequestListener: Send + Sync {
    /// The request was handed to the transport.
    fn handle_sent(&self, _event: &RequestSentEvent) -> ListenerResult { Ok(()) }

    /// A packet carrying the request's id arrived. May fire more than once.
    fn handle_response(&self, _event: &SnacResponseEvent) -> ListenerResult { Ok(()) }

    /// The request expired or the processor was detached.
    fn handle_timeout(&self, _event: &RequestTimeoutEvent) -> ListenerResult { Ok(()) }

    /// Name used when reporting failures.
    fn describe(&self) -> String { type_name::<Self>().to_owned() }
}

impl<F> SnacPreprocessor for F
where
    F: Fn(&mut MutableSnacPacket) -> ListenerResult + Send + Sync,
{
    fn process(&self, packet: &mut MutableSnacPacket) -> ListenerResult { self(packet) }
}

impl<F> VetoablePacketListener for F
where
    F: Fn(&SnacPacketEvent) -> ListenerResult<Dispatch> + Send + Sync,
{
    fn handle_packet(&self, event: &SnacPacketEvent) -> ListenerResult<Dispatch> { self(event) }
}

impl<F> PacketListener for F
where
    F: Fn(&SnacPacketEvent) -> ListenerResult + Send + Sync,
{
    fn handle_packet(&self, event: &SnacPacketEvent) -> ListenerResult { self(event) }
}

impl<F> ResponseListener for F
where
    F: Fn(&SnacResponseEvent) -> ListenerResult + Send + Sync,
{
    fn handle_response(&self, event: &SnacResponseEvent) -> ListenerResult { self(event) }
}

/// Ordered, duplicate-free set of shared listeners.
///
/// Identity is pointer identity of the `Arc`: adding the same `Arc` twice is a
/// no-op, while two separately allocated but equal listeners are distinct.
pub struct ListenerSet<L: ?Sized> {
    members: RwLock<Arc<[Arc<L>]>>,
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self {
            members: RwLock::new(Arc::from(Vec::new())),
        }
    }
}

impl<L: ?Sized> std::fmt::Debug for ListenerSet<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}

impl<L: ?Sized> ListenerSet<L> {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Append `listener` unless it is already a member.
    ///
    /// Returns `true` if the set changed.
    pub fn add(&self, listener: Arc<L>) -> bool {
        let mut members = self.members.write();
        if members.iter().any(|m| same(m, &listener)) {
            return false;
        }
        let mut next = Vec::with_capacity(members.len() + 1);
        next.extend(members.iter().cloned());
        next.push(listener);
        *members = Arc::from(next);
        true
    }

    /// Remove `listener` if present.
    ///
    /// Returns `true` if the set changed.
    pub fn remove(&self, listener: &Arc<L>) -> bool {
        let mut members = self.members.write();
        if !members.iter().any(|m| same(m, listener)) {
            return false;
        }
        let next: Vec<Arc<L>> = members
            .iter()
            .filter(|m| !same(m, listener))
            .cloned()
            .collect();
        *members = Arc::from(next);
        true
    }

    /// Frozen view of the current members, in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Arc<[Arc<L>]> { Arc::clone(&*self.members.read()) }

    #[must_use]
    pub fn contains(&self, listener: &Arc<L>) -> bool {
        self.members.read().iter().any(|m| same(m, listener))
    }

    #[must_use]
    pub fn len(&self) -> usize { self.members.read().len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.members.read().is_empty() }
}

fn same<L: ?Sized>(a: &Arc<L>, b: &Arc<L>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
