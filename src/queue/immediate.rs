//! Default policy: send at once.

use crate::{
    error::SendError,
    processor::SnacProcessor,
    queue::QueueManager,
    request::SnacRequest,
};

/// Sends every request immediately and ignores pausing.
///
/// Callers that need requests held while paused must install another policy
/// such as [`PausableQueueManager`](super::PausableQueueManager).
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateQueueManager;

impl QueueManager for ImmediateQueueManager {
    fn queue_send(&self, owner: &SnacProcessor, request: SnacRequest) -> Result<(), SendError> {
        owner.send_immediately(&request).map(|_| ())
    }

    fn clear_queue(&self, _owner: &SnacProcessor) {}
}
