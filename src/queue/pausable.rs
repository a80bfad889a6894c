//! Policy that holds requests while the owner is paused.

use std::collections::VecDeque;

use dashmap::{DashMap, mapref::one::RefMut};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::SendError,
    processor::{ProcessorId, SnacProcessor},
    queue::QueueManager,
    request::SnacRequest,
};

#[derive(Debug)]
struct OwnerQueue {
    paused: bool,
    held: VecDeque<SnacRequest>,
    closed: CancellationToken,
}

impl OwnerQueue {
    fn new(owner: &SnacProcessor) -> Self {
        Self {
            paused: false,
            held: VecDeque::new(),
            closed: owner.closed(),
        }
    }
}

/// Sends immediately while unpaused; while paused, holds requests and sends
/// them in submission order once unpaused.
///
/// One manager may serve several processors; each has its own queue. Queues
/// of processors dropped without detaching are discarded the next time a
/// processor attaches.
#[derive(Debug, Default)]
pub struct PausableQueueManager {
    owners: DashMap<ProcessorId, OwnerQueue>,
}

impl PausableQueueManager {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of requests currently held for `owner`.
    #[must_use]
    pub fn held(&self, owner: &SnacProcessor) -> usize {
        self.owners
            .get(&owner.id())
            .map_or(0, |queue| queue.held.len())
    }

    /// Number of processors this manager keeps a queue for.
    #[must_use]
    pub fn owner_count(&self) -> usize { self.owners.len() }

    fn queue_for(&self, owner: &SnacProcessor) -> RefMut<'_, ProcessorId, OwnerQueue> {
        self.owners
            .entry(owner.id())
            .or_insert_with(|| OwnerQueue::new(owner))
    }

    fn flush(owner: &SnacProcessor, requests: VecDeque<SnacRequest>) {
        for request in requests {
            if let Err(error) = owner.send_immediately(&request) {
                warn!(processor = %owner.id(), id = ?request.id(), %error, "failed to send held request");
            }
        }
    }
}

impl QueueManager for PausableQueueManager {
    fn attached(&self, owner: &SnacProcessor) {
        self.owners.retain(|_, queue| !queue.closed.is_cancelled());
        self.queue_for(owner);
    }

    fn detached(&self, owner: &SnacProcessor) { self.owners.remove(&owner.id()); }

    fn queue_send(&self, owner: &SnacProcessor, request: SnacRequest) -> Result<(), SendError> {
        // The map guard must be released before sending: listeners fired by
        // the send may queue further requests.
        if let Some(mut queue) = self.owners.get_mut(&owner.id()) {
            if queue.paused {
                debug!(processor = %owner.id(), id = ?request.id(), "holding request while paused");
                queue.held.push_back(request);
                return Ok(());
            }
        }
        owner.send_immediately(&request).map(|_| ())
    }

    fn pause(&self, owner: &SnacProcessor) { self.queue_for(owner).paused = true; }

    fn unpause(&self, owner: &SnacProcessor) {
        let held = match self.owners.get_mut(&owner.id()) {
            Some(mut queue) => {
                queue.paused = false;
                std::mem::take(&mut queue.held)
            }
            None => return,
        };
        Self::flush(owner, held);
    }

    fn clear_queue(&self, owner: &SnacProcessor) {
        if let Some(mut queue) = self.owners.get_mut(&owner.id()) {
            let dropped = queue.held.len();
            queue.held.clear();
            if dropped > 0 {
                debug!(processor = %owner.id(), dropped, "cleared held requests");
            }
        }
    }
}
