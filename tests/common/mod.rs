//! Shared utilities for integration tests.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::sync::Arc;

use parking_lot::Mutex;
use snacframe::{QueueManager, SendError, SnacProcessor, SnacRequest};
use snacframe_testing::CallLog;

/// Result type for fallible integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Queue manager that records its hooks and sends immediately.
pub struct HookRecorder {
    label: &'static str,
    log: CallLog,
    held: Mutex<Vec<SnacRequest>>,
    hold: bool,
}

impl HookRecorder {
    pub fn new(label: &'static str, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            label,
            log: log.clone(),
            held: Mutex::new(Vec::new()),
            hold: false,
        })
    }

    /// A recorder that keeps every request instead of sending it.
    pub fn holding(label: &'static str, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            label,
            log: log.clone(),
            held: Mutex::new(Vec::new()),
            hold: true,
        })
    }

    pub fn held(&self) -> usize { self.held.lock().len() }

    fn record(&self, hook: &str) { self.log.push(format!("{}:{hook}", self.label)); }
}

impl QueueManager for HookRecorder {
    fn attached(&self, _owner: &SnacProcessor) { self.record("attached"); }

    fn detached(&self, _owner: &SnacProcessor) { self.record("detached"); }

    fn queue_send(&self, owner: &SnacProcessor, request: SnacRequest) -> Result<(), SendError> {
        self.record("queue_send");
        if self.hold {
            self.held.lock().push(request);
            return Ok(());
        }
        owner.send_immediately(&request).map(|_| ())
    }

    fn pause(&self, _owner: &SnacProcessor) { self.record("pause"); }

    fn unpause(&self, _owner: &SnacProcessor) { self.record("unpause"); }

    fn clear_queue(&self, _owner: &SnacProcessor) {
        self.held.lock().clear();
        self.record("clear_queue");
    }
}
