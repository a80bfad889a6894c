//! Listener fault isolation.
//!
//! Every preprocessor and listener call runs through [`isolate`]. A returned
//! error or a panic becomes a [`ListenerFault`] naming the category and the
//! offending listener; the caller reports it and moves on to the next
//! listener.

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
};

use thiserror::Error;

use crate::panic::{PanicMessage, format_panic};

/// Error type listeners return to signal failure.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by listener callbacks.
pub type ListenerResult<T = ()> = Result<T, ListenerError>;

/// Which kind of callback failed.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// A packet preprocessor.
    Preprocessor,
    /// A vetoable or ordinary packet listener.
    PacketListener,
    /// A request's own listener or a global request listener.
    RequestListener,
    /// A global response listener.
    ResponseListener,
}

impl FaultKind {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preprocessor => "preprocessor",
            Self::PacketListener => "packet_listener",
            Self::RequestListener => "request_listener",
            Self::ResponseListener => "response_listener",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// How a callback failed.
#[derive(Debug, Error)]
pub enum FaultCause {
    /// The callback returned an error.
    #[error("listener returned an error: {0}")]
    Error(#[source] ListenerError),
    /// The callback panicked.
    #[error("listener panicked: {0}")]
    Panic(PanicMessage),
}

/// A failed callback, as handed to the transport's error sink.
#[derive(Debug, Error)]
#[error("{kind} fault in {context}: {cause}")]
pub struct ListenerFault {
    kind: FaultKind,
    context: String,
    #[source]
    cause: FaultCause,
}

impl ListenerFault {
    /// Build a fault record.
    #[must_use]
    pub fn new(kind: FaultKind, context: impl Into<String>, cause: FaultCause) -> Self {
        Self {
            kind,
            context: context.into(),
            cause,
        }
    }

    #[must_use]
    pub fn kind(&self) -> FaultKind { self.kind }

    /// Description of the listener that failed.
    #[must_use]
    pub fn context(&self) -> &str { &self.context }

    #[must_use]
    pub fn cause(&self) -> &FaultCause { &self.cause }

    /// Whether the callback panicked rather than returning an error.
    #[must_use]
    pub fn is_panic(&self) -> bool { matches!(self.cause, FaultCause::Panic(_)) }
}

/// Run `call`, converting an error or panic into a [`FaultCause`].
pub(crate) fn isolate<T>(call: impl FnOnce() -> ListenerResult<T>) -> Result<T, FaultCause> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(FaultCause::Error(error)),
        Err(payload) => Err(FaultCause::Panic(format_panic(payload))),
    }
}
