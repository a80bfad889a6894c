//! Listeners that record their callbacks into a shared log.
//!
//! One [`Recorder`] implements every listener trait, so a single log can
//! capture the relative order of callbacks across listener categories.
//! Entries have the form `"<label>:<callback>:<detail>"`.

use std::sync::Arc;

use parking_lot::Mutex;
use snacframe::{
    Dispatch,
    ListenerResult,
    OutgoingRequestListener,
    PacketListener,
    RequestSentEvent,
    RequestTimeoutEvent,
    ResponseListener,
    SnacPacketEvent,
    SnacRequestListener,
    SnacResponseEvent,
    VetoablePacketListener,
};

/// Shared, ordered record of listener callbacks.
#[derive(Clone, Debug, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    pub fn push(&self, entry: impl Into<String>) { self.0.lock().push(entry.into()); }

    /// Snapshot of the entries so far.
    #[must_use]
    pub fn entries(&self) -> Vec<String> { self.0.lock().clone() }

    /// Remove and return the entries so far.
    pub fn take(&self) -> Vec<String> { std::mem::take(&mut *self.0.lock()) }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.lock().is_empty() }
}

/// Listener writing every callback to a [`CallLog`].
///
/// As a vetoable listener it answers with the verdict it was built with.
#[derive(Clone, Debug)]
pub struct Recorder {
    label: String,
    log: CallLog,
    verdict: Dispatch,
}

impl Recorder {
    /// A recorder that lets vetoable dispatch continue.
    #[must_use]
    pub fn new(label: impl Into<String>, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            log: log.clone(),
            verdict: Dispatch::Continue,
        })
    }

    /// A recorder that stops vetoable dispatch.
    #[must_use]
    pub fn stopping(label: impl Into<String>, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            log: log.clone(),
            verdict: Dispatch::Stop,
        })
    }

    fn record(&self, callback: &str, detail: impl std::fmt::Display) {
        self.log.push(format!("{}:{callback}:{detail}", self.label));
    }
}

fn packet_detail(event: &SnacPacketEvent) -> String {
    let packet = event.packet();
    format!("{:04x}/{:04x}", packet.family(), packet.subtype())
}

impl VetoablePacketListener for Recorder {
    fn handle_packet(&self, event: &SnacPacketEvent) -> ListenerResult<Dispatch> {
        self.record("veto", packet_detail(event));
        Ok(self.verdict)
    }

    fn describe(&self) -> String { self.label.clone() }
}

impl PacketListener for Recorder {
    fn handle_packet(&self, event: &SnacPacketEvent) -> ListenerResult {
        self.record("packet", packet_detail(event));
        Ok(())
    }

    fn describe(&self) -> String { self.label.clone() }
}

impl ResponseListener for Recorder {
    fn handle_response(&self, event: &SnacResponseEvent) -> ListenerResult {
        self.record("response", event.packet().request_id().as_u32());
        Ok(())
    }

    fn describe(&self) -> String { self.label.clone() }
}

impl OutgoingRequestListener for Recorder {
    fn handle_sent(&self, event: &RequestSentEvent) -> ListenerResult {
        self.record("sent", request_detail(event.request()));
        Ok(())
    }

    fn handle_timeout(&self, event: &RequestTimeoutEvent) -> ListenerResult {
        self.record("timeout", request_detail(event.request()));
        Ok(())
    }

    fn describe(&self) -> String { self.label.clone() }
}

impl SnacRequestListener for Recorder {
    fn handle_sent(&self, event: &RequestSentEvent) -> ListenerResult {
        self.record("req-sent", request_detail(event.request()));
        Ok(())
    }

    fn handle_response(&self, event: &SnacResponseEvent) -> ListenerResult {
        self.record("req-response", event.packet().request_id().as_u32());
        Ok(())
    }

    fn handle_timeout(&self, event: &RequestTimeoutEvent) -> ListenerResult {
        self.record("req-timeout", request_detail(event.request()));
        Ok(())
    }

    fn describe(&self) -> String { self.label.clone() }
}

fn request_detail(request: &snacframe::SnacRequest) -> String {
    request
        .id()
        .map_or_else(|| "-".to_owned(), |id| id.as_u32().to_string())
}
