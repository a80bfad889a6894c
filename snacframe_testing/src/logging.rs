//! Serialised access to a global `logtest` logger.
//!
//! `snacframe` logs through `tracing` with its `log` bridge enabled, so every
//! event is also captured here as a `log` record.

use std::sync::{Mutex, MutexGuard, OnceLock};

use log::Level;
use logtest::Logger;
use rstest::fixture;

/// Handle to the global logger with exclusive access.
///
/// Holding the handle keeps other tests from draining the same records.
pub struct LoggerHandle {
    guard: MutexGuard<'static, Logger>,
}

impl LoggerHandle {
    /// Acquire the global [`Logger`], discarding records left by earlier
    /// tests.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder panicked while holding the logger.
    #[must_use]
    pub fn new() -> Self {
        static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

        let logger = LOGGER.get_or_init(|| Mutex::new(Logger::start()));
        let mut guard = logger.lock().expect("logger poisoned");
        while guard.pop().is_some() {}

        Self { guard }
    }

    /// Drain captured records, returning whether any at `level` or more
    /// severe contains `needle`.
    pub fn drain_contains(&mut self, level: Level, needle: &str) -> bool {
        let mut found = false;
        while let Some(record) = self.guard.pop() {
            if record.level() <= level && record.args().contains(needle) {
                found = true;
            }
        }
        found
    }
}

impl Default for LoggerHandle {
    fn default() -> Self { Self::new() }
}

impl std::ops::Deref for LoggerHandle {
    type Target = Logger;

    fn deref(&self) -> &Self::Target { &self.guard }
}

impl std::ops::DerefMut for LoggerHandle {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.guard }
}

/// Exclusive logger handle for a test.
#[fixture]
pub fn logger() -> LoggerHandle {
    LoggerHandle::new()
}
