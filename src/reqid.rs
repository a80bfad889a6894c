//! Request identifiers and their allocator.
//!
//! Client-issued SNAC requests draw identifiers from `[1, 2^31 - 1]`. The
//! upper half of the 32-bit space belongs to server-initiated exchanges and is
//! only recognised, never allocated. The allocator wraps back to the bottom of
//! its range once exhausted; collisions with still-outstanding requests are
//! not detected.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicU32, Ordering};

/// Lowest identifier a client may allocate.
pub const REQID_MIN_CLIENT: u32 = 1;
/// Highest identifier a client may allocate.
pub const REQID_MAX_CLIENT: u32 = 0x7fff_ffff;
/// Lowest identifier used by server-initiated exchanges.
pub const REQID_MIN_SERVER: u32 = 0x8000_0000;
/// Highest identifier used by server-initiated exchanges.
pub const REQID_MAX_SERVER: u32 = u32::MAX;

/// Correlation key carried in every SNAC header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u32);

impl From<u32> for RequestId {
    fn from(value: u32) -> Self { Self(value) }
}

impl From<RequestId> for u32 {
    fn from(value: RequestId) -> Self { value.0 }
}

impl RequestId {
    /// Create a new [`RequestId`] with the provided value.
    #[must_use]
    pub const fn new(id: u32) -> Self { Self(id) }

    /// Return the inner `u32` representation.
    #[must_use]
    pub const fn as_u32(self) -> u32 { self.0 }

    /// Whether the identifier lies in the client-allocated range.
    #[must_use]
    pub const fn is_client(self) -> bool {
        self.0 >= REQID_MIN_CLIENT && self.0 <= REQID_MAX_CLIENT
    }

    /// Whether the identifier lies in the server-originated range.
    #[must_use]
    pub const fn is_server(self) -> bool { self.0 >= REQID_MIN_SERVER }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

/// Wrapping sequence of request identifiers.
///
/// `next` is lock-free and may be called from any number of threads; every
/// caller observes a distinct value until the range wraps.
#[derive(Debug)]
pub struct RequestIdAllocator {
    next: AtomicU32,
    min: u32,
    max: u32,
}

impl Default for RequestIdAllocator {
    fn default() -> Self { Self::with_range(REQID_MIN_CLIENT, REQID_MAX_CLIENT) }
}

impl RequestIdAllocator {
    /// Create an allocator over the client range.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create an allocator over `[min, max]`.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    #[must_use]
    pub fn with_range(min: u32, max: u32) -> Self {
        assert!(min <= max, "request id range is empty: {min} > {max}");
        Self {
            next: AtomicU32::new(min),
            min,
            max,
        }
    }

    /// Create a client-range allocator whose first identifier is `first`.
    ///
    /// Values outside the client range are clamped into it.
    #[must_use]
    pub fn starting_at(first: u32) -> Self {
        let alloc = Self::default();
        alloc
            .next
            .store(first.clamp(REQID_MIN_CLIENT, REQID_MAX_CLIENT), Ordering::Relaxed);
        alloc
    }

    /// Return the next identifier, wrapping to the range minimum after the
    /// maximum has been handed out.
    pub fn next(&self) -> RequestId {
        let (min, max) = (self.min, self.max);
        let previous = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(if current >= max { min } else { current + 1 })
            });
        // The closure never returns `None`, so both arms carry the old value.
        let (Ok(id) | Err(id)) = previous;
        RequestId(id)
    }
}
