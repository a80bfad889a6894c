#![cfg(not(loom))]
//! Tests for request registration, sending and response routing.

mod common;

use std::sync::Arc;

use common::TestResult;
use rstest::rstest;
use snacframe::{DispatchOutcome, RequestId, SendError, SnacProcessor};
use snacframe_testing::{
    CallLog,
    MockTransport,
    Recorder,
    attached,
    processor,
    raw_request,
    reply_to,
    unsolicited,
};

type Attached = (SnacProcessor, Arc<MockTransport>);

#[rstest]
fn sent_packets_carry_sequential_client_ids(attached: Attached) -> TestResult {
    let (processor, transport) = attached;
    for subtype in 1..=3 {
        processor.send(&raw_request(0x0004, subtype))?;
    }
    let sent = transport.sent();
    let ids: Vec<u32> = sent.iter().map(|p| p.request_id().as_u32()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(sent.iter().all(|p| p.family() == 0x0004));
    assert!(sent.iter().all(|p| p.request_id().is_client()));
    Ok(())
}

#[rstest]
fn response_goes_to_response_listeners_not_packet_listeners(attached: Attached) -> TestResult {
    let (processor, transport) = attached;
    let log = CallLog::new();
    processor.add_global_response_listener(Recorder::new("global", &log));
    processor.add_packet_listener(Recorder::new("packets", &log));
    processor.add_vetoable_packet_listener(Recorder::new("veto", &log));

    let request = raw_request(0x0001, 0x0004);
    request.add_listener(Recorder::new("own", &log));
    let id = processor.send(&request)?;
    log.take();

    let outcome = processor.process_packet(reply_to(&transport.sent()[0]));
    assert_eq!(outcome, DispatchOutcome::Response(id));
    assert_eq!(
        log.entries(),
        vec![
            format!("global:response:{}", id.as_u32()),
            format!("own:req-response:{}", id.as_u32()),
        ]
    );
    Ok(())
}

#[rstest]
fn responses_keep_matching_while_request_is_outstanding(attached: Attached) -> TestResult {
    let (processor, transport) = attached;
    let log = CallLog::new();
    let request = raw_request(0x0013, 0x0005);
    request.add_listener(Recorder::new("own", &log));
    processor.send(&request)?;

    let reply = reply_to(&transport.sent()[0]);
    assert!(transport.deliver_snac(&reply));
    assert!(transport.deliver_snac(&reply));
    assert_eq!(log.entries(), vec!["own:req-response:1", "own:req-response:1"]);
    assert_eq!(processor.outstanding_requests(), 1);
    Ok(())
}

#[rstest]
fn unmatched_packet_reaches_each_packet_listener_once_in_order(attached: Attached) {
    let (processor, transport) = attached;
    let log = CallLog::new();
    for label in ["a", "b", "c"] {
        processor.add_packet_listener(Recorder::new(label, &log));
    }

    assert!(transport.deliver_snac(&unsolicited(0x0003, 0x000b, 0x8000_0001)));
    assert_eq!(
        log.entries(),
        vec!["a:packet:0003/000b", "b:packet:0003/000b", "c:packet:0003/000b"]
    );
}

#[rstest]
fn response_with_unknown_id_is_delivered_as_unsolicited(attached: Attached) -> TestResult {
    let (processor, _transport) = attached;
    let log = CallLog::new();
    processor.add_packet_listener(Recorder::new("packets", &log));
    processor.send(&raw_request(1, 2))?;

    let outcome = processor.process_packet(unsolicited(1, 3, 99));
    assert_eq!(outcome, DispatchOutcome::Delivered);
    assert_eq!(log.entries(), vec!["packets:packet:0001/0003"]);
    Ok(())
}

#[rstest]
fn sent_event_reaches_global_listeners_before_request_listeners(attached: Attached) -> TestResult {
    let (processor, _transport) = attached;
    let log = CallLog::new();
    processor.add_global_request_listener(Recorder::new("global", &log));
    let request = raw_request(1, 2);
    request.add_listener(Recorder::new("own", &log));

    processor.send(&request)?;
    assert_eq!(log.entries(), vec!["global:sent:1", "own:req-sent:1"]);
    assert!(request.is_sent());
    assert!(request.sent_at().is_some());
    Ok(())
}

#[rstest]
#[case::immediate_twice(false)]
#[case::queued_then_immediate(true)]
fn sending_a_sent_request_again_fails(attached: Attached, #[case] queued_first: bool) -> TestResult {
    let (processor, transport) = attached;
    let request = raw_request(1, 2);
    let id = if queued_first {
        processor.send(&request)?
    } else {
        processor.send_immediately(&request)?
    };

    assert_eq!(processor.send_immediately(&request), Err(SendError::AlreadySent(id)));
    assert_eq!(processor.send(&request), Err(SendError::AlreadySent(id)));
    assert_eq!(transport.sent().len(), 1);
    Ok(())
}

#[rstest]
fn sending_immediately_while_detached_leaves_request_untouched(processor: SnacProcessor) {
    let request = raw_request(1, 2);
    assert_eq!(processor.send_immediately(&request), Err(SendError::Detached));
    assert_eq!(request.id(), None);
    assert_eq!(processor.outstanding_requests(), 0);
}

#[rstest]
fn queued_send_while_detached_can_be_retried_after_attach(processor: SnacProcessor) -> TestResult {
    let request = raw_request(1, 2);
    assert_eq!(processor.send(&request), Err(SendError::Detached));
    let id = request.id().ok_or("request should be registered")?;

    let transport = MockTransport::new();
    processor.attach(transport.clone());
    // attach resets the table, so the earlier registration is gone
    assert_eq!(processor.send(&request), Err(SendError::RequestRetired(id)));
    assert!(transport.sent().is_empty());
    Ok(())
}

#[rstest]
fn default_manager_sends_while_paused(attached: Attached) -> TestResult {
    let (processor, transport) = attached;
    processor.pause();
    let request = raw_request(1, 2);
    let first = processor.send(&request)?;
    assert_eq!(first, RequestId::new(1));
    assert_eq!(transport.sent().len(), 1, "default manager ignores pause");
    Ok(())
}
