//! Send-scheduling policies.
//!
//! A [`QueueManager`] decides when a registered request is actually handed to
//! the transport. The processor owns exactly one manager at a time and keeps it
//! informed through lifecycle hooks: `attached`/`detached` when it is
//! installed or replaced, `pause`/`unpause` when the processor is paused, and
//! `clear_queue` when held requests must be dropped. Dropped requests are not
//! timed out by the manager; the request table does that.
//!
//! Managers deliver requests by calling
//! [`SnacProcessor::send_immediately`](crate::SnacProcessor::send_immediately).

mod immediate;
mod pausable;
mod rate_limited;

pub use immediate::ImmediateQueueManager;
pub use pausable::PausableQueueManager;
pub use rate_limited::{
    MAX_SEND_RATE,
    RateConfigError,
    RateLimitedQueueManager,
    RateLimitedQueueManagerBuilder,
};

use crate::{error::SendError, processor::SnacProcessor, request::SnacRequest};

/// Policy deciding when registered requests reach the transport.
///
/// Hooks are called without the processor's state or table locks held, so
/// implementations may call back into the owner. They run on whichever thread
/// performs the corresponding processor operation.
pub trait QueueManager: Send + Sync {
    /// Called when this manager becomes `owner`'s active manager.
    fn attached(&self, _owner: &SnacProcessor) {}

    /// Called when this manager stops being `owner`'s active manager.
    fn detached(&self, _owner: &SnacProcessor) {}

    /// Decide if and when to send `request`, which is already registered.
    ///
    /// # Errors
    ///
    /// Returns an error only when the request is sent synchronously and the
    /// send fails.
    fn queue_send(&self, owner: &SnacProcessor, request: SnacRequest) -> Result<(), SendError>;

    /// `owner` was paused.
    fn pause(&self, _owner: &SnacProcessor) {}

    /// `owner` was unpaused.
    fn unpause(&self, _owner: &SnacProcessor) {}

    /// Drop every request held for `owner`.
    fn clear_queue(&self, owner: &SnacProcessor);
}
