//! Test support for `snacframe`.
//!
//! Provides an in-memory [`MockTransport`], listeners that record what they
//! see into a shared [`CallLog`], packet helpers, and a `logtest`-backed
//! logger fixture.
//!
//! ```rust
//! use snacframe::SnacProcessor;
//! use snacframe_testing::{MockTransport, raw_request, reply_to};
//!
//! let transport = MockTransport::new();
//! let processor = SnacProcessor::new();
//! processor.attach(transport.clone());
//! processor.send(&raw_request(1, 2)).unwrap();
//! let sent = transport.sent();
//! assert_eq!(sent.len(), 1);
//! assert!(transport.deliver_snac(&reply_to(&sent[0])));
//! ```

pub mod fixtures;
pub mod logging;
pub mod packets;
pub mod recorder;
pub mod transport;

pub use fixtures::{attached, processor};
pub use logging::{LoggerHandle, logger};
pub use packets::{raw_request, reply_to, unsolicited};
pub use recorder::{CallLog, Recorder};
pub use transport::{MockTransport, RecordedFault};
