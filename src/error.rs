//! Canonical error and result types for the crate.
//!
//! Listener failures are never returned to callers; they are isolated and
//! reported as [`ListenerFault`](crate::fault::ListenerFault)s. The errors here
//! are the programmer errors a caller must see synchronously.

use thiserror::Error;

use crate::reqid::RequestId;

/// Errors returned by the send paths and the request table.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The request has already been handed to the transport.
    #[error("request {0} was already sent")]
    AlreadySent(RequestId),
    /// The request was registered once but its entry has since been removed
    /// (expired or cleared by detach) before it was sent.
    #[error("request {0} is no longer tracked")]
    RequestRetired(RequestId),
    /// The request was never registered with a table.
    #[error("request has not been registered")]
    Unregistered,
    /// The processor has no transport to send through.
    #[error("processor is not attached to a transport")]
    Detached,
}

/// Canonical result alias used by `snacframe` public APIs.
pub type Result<T> = std::result::Result<T, SendError>;
