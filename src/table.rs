//! Outstanding-request table with time-to-live expiry.
//!
//! Entries live in a map keyed by [`RequestId`] from registration onwards and
//! join a FIFO once sent. Send times are clamped to be non-decreasing, so the
//! FIFO is ordered by send time and a sweep can stop at the first entry that
//! has not yet expired. Expired requests are returned to the caller, which
//! notifies listeners after the table lock has been released.
//!
//! With a zero time-to-live a request leaves the map as soon as it is sent,
//! so its id is never correlated. It is held aside until the next sweep
//! reports it as timed out.

use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::{
    error::SendError,
    reqid::{RequestId, RequestIdAllocator},
    request::SnacRequest,
};

/// Default time-to-live for sent requests.
pub const DEFAULT_REQUEST_TTL: Duration = Duration::from_secs(900);

/// Outcome of [`RequestTable::register`].
#[derive(Debug)]
pub struct Registration {
    /// Identifier of the registered request.
    pub id: RequestId,
    /// `false` when the request had already been registered.
    pub fresh: bool,
    /// Requests expired by the sweep performed during registration.
    pub expired: Vec<SnacRequest>,
}

#[derive(Debug)]
struct TableState {
    ttl: Duration,
    entries: HashMap<RequestId, SnacRequest>,
    sent: VecDeque<RequestId>,
    retired: Vec<SnacRequest>,
    last_sent: Option<Instant>,
}

impl TableState {
    fn tracked(&self, request: &SnacRequest, id: RequestId) -> bool {
        self.entries.get(&id).is_some_and(|entry| entry.ptr_eq(request))
    }

    fn sweep(&mut self, now: Instant) -> Vec<SnacRequest> {
        if self.ttl.is_zero() {
            return self.drain();
        }
        let mut expired = std::mem::take(&mut self.retired);
        while let Some(&id) = self.sent.front() {
            let sent_at = self.entries.get(&id).and_then(SnacRequest::sent_at);
            if sent_at.is_some_and(|at| now.saturating_duration_since(at) < self.ttl) {
                break;
            }
            self.sent.pop_front();
            if let Some(request) = self.entries.remove(&id) {
                expired.push(request);
            }
        }
        expired.sort_by_key(SnacRequest::sent_at);
        expired
    }

    /// Remove every entry: sent ones in send order, then unsent ones by id.
    fn drain(&mut self) -> Vec<SnacRequest> {
        let mut out = std::mem::take(&mut self.retired);
        for id in self.sent.drain(..) {
            if let Some(request) = self.entries.remove(&id) {
                out.push(request);
            }
        }
        out.sort_by_key(SnacRequest::sent_at);
        let mut unsent: Vec<_> = self.entries.drain().collect();
        unsent.sort_unstable_by_key(|(id, _)| *id);
        out.extend(unsent.into_iter().map(|(_, request)| request));
        out
    }
}

/// Table of outstanding requests.
#[derive(Debug)]
pub struct RequestTable {
    ids: RequestIdAllocator,
    state: Mutex<TableState>,
}

impl Default for RequestTable {
    fn default() -> Self { Self::new(DEFAULT_REQUEST_TTL) }
}

impl RequestTable {
    /// Create an empty table with the given time-to-live.
    #[must_use]
    pub fn new(ttl: Duration) -> Self { Self::with_allocator(ttl, RequestIdAllocator::new()) }

    /// Create an empty table drawing identifiers from `ids`.
    #[must_use]
    pub fn with_allocator(ttl: Duration, ids: RequestIdAllocator) -> Self {
        Self {
            ids,
            state: Mutex::new(TableState {
                ttl,
                entries: HashMap::new(),
                sent: VecDeque::new(),
                retired: Vec::new(),
                last_sent: None,
            }),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration { self.state.lock().ttl }

    /// Change the time-to-live applied by subsequent sweeps.
    pub fn set_ttl(&self, ttl: Duration) { self.state.lock().ttl = ttl; }

    /// Register `request`, assigning it an identifier.
    ///
    /// A request that already carries an identifier is returned unchanged
    /// with `fresh == false`. Otherwise expired entries are swept first.
    ///
    /// # Errors
    ///
    /// For a request registered earlier whose entry has since been removed,
    /// returns [`SendError::AlreadySent`] if it was sent and
    /// [`SendError::RequestRetired`] otherwise.
    pub fn register(&self, request: &SnacRequest, now: Instant) -> Result<Registration, SendError> {
        let mut state = self.state.lock();
        if let Some(id) = request.id() {
            if state.tracked(request, id) {
                return Ok(Registration {
                    id,
                    fresh: false,
                    expired: Vec::new(),
                });
            }
            return Err(if request.is_sent() {
                SendError::AlreadySent(id)
            } else {
                SendError::RequestRetired(id)
            });
        }
        let expired = state.sweep(now);
        let id = self.ids.next();
        request.assign_id(id);
        state.entries.insert(id, request.clone());
        trace!(%id, swept = expired.len(), "registered request");
        Ok(Registration {
            id,
            fresh: true,
            expired,
        })
    }

    /// Record that `request` has been handed to the transport.
    ///
    /// Returns the recorded send time, which is `now` unless that would
    /// precede an earlier send. With a zero time-to-live the entry is removed
    /// at once and reported by the next sweep.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::AlreadySent`] if the request was marked before and
    /// [`SendError::Unregistered`] if it was never registered.
    pub fn mark_sent(&self, request: &SnacRequest, now: Instant) -> Result<Instant, SendError> {
        let mut state = self.state.lock();
        let id = request.id().ok_or(SendError::Unregistered)?;
        let at = state.last_sent.map_or(now, |last| now.max(last));
        if !request.record_sent(at) {
            return Err(SendError::AlreadySent(id));
        }
        state.last_sent = Some(at);
        if !state.tracked(request, id) {
            return Ok(at);
        }
        if state.ttl.is_zero() {
            if let Some(retired) = state.entries.remove(&id) {
                state.retired.push(retired);
            }
        } else {
            state.sent.push_back(id);
        }
        Ok(at)
    }

    /// Remove and return every expired request.
    ///
    /// With a zero time-to-live every entry expires, sent or not. Requests
    /// are returned sent ones first, in send order.
    pub fn sweep(&self, now: Instant) -> Vec<SnacRequest> { self.state.lock().sweep(now) }

    /// Remove and return every entry regardless of age.
    pub fn clear_all(&self) -> Vec<SnacRequest> { self.state.lock().drain() }

    /// The outstanding request registered under `id`.
    #[must_use]
    pub fn lookup(&self, id: RequestId) -> Option<SnacRequest> {
        self.state.lock().entries.get(&id).cloned()
    }

    /// Number of registered requests.
    #[must_use]
    pub fn len(&self) -> usize { self.state.lock().entries.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.state.lock().entries.is_empty() }

    /// Number of sent requests awaiting expiry, including those already
    /// dropped from correlation under a zero time-to-live.
    #[must_use]
    pub fn pending_expiry(&self) -> usize {
        let state = self.state.lock();
        state.sent.len() + state.retired.len()
    }
}
