//! Utilities for working with panic payloads.
//!
//! Listener panics are caught during dispatch and reported like ordinary
//! listener errors; these helpers turn the payload into readable text.

use std::{any::Any, fmt};

/// Wrapper that formats a panic payload when logged or displayed.
///
/// The payload is downcast to `String` or `&'static str` if possible and falls
/// back to a placeholder otherwise.
///
/// ```
/// use snacframe::panic::format_panic;
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert_eq!(
///     format_panic(Box::new(String::from("boom"))).to_string(),
///     "boom"
/// );
/// assert!(format_panic(Box::new(5_u32)).to_string().contains("non-string"));
/// ```
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl PanicMessage {
    fn as_str(&self) -> Option<&str> {
        self.0
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| self.0.downcast_ref::<&'static str>().copied())
    }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => f.write_str(s),
            None => f.write_str("<non-string panic payload>"),
        }
    }
}

impl fmt::Debug for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicMessage").field(&self.to_string()).finish()
    }
}

/// Create a [`PanicMessage`] for the given payload.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }
