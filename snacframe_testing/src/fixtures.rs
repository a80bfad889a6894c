//! `rstest` fixtures for processors.

use std::sync::Arc;

use rstest::fixture;
use snacframe::SnacProcessor;

use crate::transport::MockTransport;

/// A detached processor with default settings.
#[fixture]
pub fn processor() -> SnacProcessor {
    SnacProcessor::new()
}

/// A default processor attached to a fresh [`MockTransport`].
#[fixture]
pub fn attached() -> (SnacProcessor, Arc<MockTransport>) {
    let transport = MockTransport::new();
    let processor = SnacProcessor::new();
    processor.attach(transport.clone());
    (processor, transport)
}
