//! Metric helpers for `snacframe`.
//!
//! This module defines metric names and thin helpers wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::{dispatch::DispatchOutcome, fault::FaultKind};

/// Name of the counter tracking dispatched inbound packets.
pub const PACKETS_DISPATCHED: &str = "snacframe_packets_dispatched_total";
/// Name of the counter tracking requests handed to the transport.
pub const REQUESTS_SENT: &str = "snacframe_requests_sent_total";
/// Name of the counter tracking requests that timed out or were cancelled.
pub const REQUESTS_TIMED_OUT: &str = "snacframe_requests_timed_out_total";
/// Name of the counter tracking isolated listener failures.
pub const LISTENER_FAULTS: &str = "snacframe_listener_faults_total";

/// Record a dispatched packet and how it left the pipeline.
pub fn inc_packets_dispatched(outcome: DispatchOutcome) {
    #[cfg(feature = "metrics")]
    counter!(PACKETS_DISPATCHED, "outcome" => outcome.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

/// Record a request handed to the transport.
pub fn inc_requests_sent() {
    #[cfg(feature = "metrics")]
    counter!(REQUESTS_SENT).increment(1);
}

/// Record a request timing out.
pub fn inc_requests_timed_out() {
    #[cfg(feature = "metrics")]
    counter!(REQUESTS_TIMED_OUT).increment(1);
}

/// Record a listener failure of the given kind.
pub fn inc_listener_faults(kind: FaultKind) {
    #[cfg(feature = "metrics")]
    counter!(LISTENER_FAULTS, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}
