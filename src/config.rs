//! Processor configuration.
//!
//! [`ProcessorConfig`] is a plain serde-friendly record so applications can
//! load processor settings alongside the rest of their configuration and
//! apply them with [`SnacProcessorBuilder::config`](crate::SnacProcessorBuilder::config).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::table::DEFAULT_REQUEST_TTL;

/// Settings applied when building a [`SnacProcessor`](crate::SnacProcessor).
///
/// ```
/// use snacframe::ProcessorConfig;
///
/// let config = ProcessorConfig::default();
/// assert_eq!(config.request_ttl_secs, 900);
/// assert_eq!(config.first_request_id, None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    /// Seconds a sent request stays eligible for correlation. Zero expires
    /// outstanding requests whenever a new one is registered.
    pub request_ttl_secs: u64,
    /// First request id to allocate; clamped into the client range.
    pub first_request_id: Option<u32>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            request_ttl_secs: DEFAULT_REQUEST_TTL.as_secs(),
            first_request_id: None,
        }
    }
}

impl ProcessorConfig {
    /// The configured time-to-live as a [`Duration`].
    #[must_use]
    pub fn request_ttl(&self) -> Duration { Duration::from_secs(self.request_ttl_secs) }
}
