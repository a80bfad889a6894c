#![doc(html_root_url = "https://docs.rs/snacframe/latest")]
//! Public API for the `snacframe` library.
//!
//! This crate correlates outgoing SNAC requests with their responses and
//! dispatches unsolicited SNAC packets to listeners, on top of an ordered
//! FLAP transport supplied by the application.

pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod factory;
pub mod fault;
pub mod listener;
pub mod metrics;
pub mod packet;
pub mod panic;
pub mod processor;
pub mod queue;
pub mod reqid;
pub mod request;
pub mod table;
pub mod transport;

pub use command::{RawCommand, SnacCommand};
pub use config::ProcessorConfig;
pub use dispatch::DispatchOutcome;
/// Result type alias for the send paths.
pub use error::{Result, SendError};
pub use event::{RequestSentEvent, RequestTimeoutEvent, SnacPacketEvent, SnacResponseEvent};
pub use factory::{CmdType, CommandFactory, CommandFactoryRegistry};
pub use fault::{FaultCause, FaultKind, ListenerError, ListenerFault, ListenerResult};
pub use listener::{
    Dispatch,
    ListenerSet,
    OutgoingRequestListener,
    PacketListener,
    ResponseListener,
    SnacPreprocessor,
    SnacRequestListener,
    VetoablePacketListener,
};
pub use metrics::{LISTENER_FAULTS, PACKETS_DISPATCHED, REQUESTS_SENT, REQUESTS_TIMED_OUT};
pub use packet::{FlapPacket, MutableSnacPacket, PacketError, SNAC_CHANNEL, SnacPacket};
pub use processor::{ProcessorId, SnacProcessor, SnacProcessorBuilder, WeakSnacProcessor};
pub use queue::{
    ImmediateQueueManager,
    MAX_SEND_RATE,
    PausableQueueManager,
    QueueManager,
    RateConfigError,
    RateLimitedQueueManager,
    RateLimitedQueueManagerBuilder,
};
pub use reqid::{RequestId, RequestIdAllocator};
pub use request::SnacRequest;
pub use table::DEFAULT_REQUEST_TTL;
pub use transport::{FlapPacketListener, FlapTransport};
