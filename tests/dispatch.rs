#![cfg(not(loom))]
//! Tests for the inbound dispatch pipeline.

mod common;

use std::sync::Arc;

use common::TestResult;
use rstest::rstest;
use snacframe::{
    CmdType,
    CommandFactory,
    Dispatch,
    DispatchOutcome,
    FaultKind,
    FlapPacket,
    ListenerResult,
    MutableSnacPacket,
    PacketListener,
    RawCommand,
    RequestId,
    SnacCommand,
    SnacPacket,
    SnacPacketEvent,
    SnacProcessor,
    SnacResponseEvent,
    VetoablePacketListener,
};
use snacframe_testing::{
    CallLog,
    MockTransport,
    Recorder,
    attached,
    raw_request,
    reply_to,
    unsolicited,
};

type Attached = (SnacProcessor, Arc<MockTransport>);

fn failing(log: &CallLog, label: &'static str) -> Arc<dyn PacketListener> {
    let log = log.clone();
    Arc::new(move |_: &SnacPacketEvent| -> ListenerResult {
        log.push(format!("{label}:failed"));
        Err(format!("{label} refused").into())
    })
}

fn panicking(log: &CallLog, label: &'static str) -> Arc<dyn PacketListener> {
    let log = log.clone();
    Arc::new(move |_: &SnacPacketEvent| -> ListenerResult {
        log.push(format!("{label}:panicked"));
        panic!("{label} exploded");
    })
}

#[rstest]
fn stop_halts_remaining_vetoable_and_packet_listeners(attached: Attached) {
    let (processor, _transport) = attached;
    let log = CallLog::new();
    processor.add_vetoable_packet_listener(Recorder::new("first", &log));
    processor.add_vetoable_packet_listener(Recorder::stopping("second", &log));
    processor.add_vetoable_packet_listener(Recorder::new("third", &log));
    processor.add_packet_listener(Recorder::new("packets", &log));

    let outcome = processor.process_packet(unsolicited(0x0002, 0x0006, 7));
    assert_eq!(outcome, DispatchOutcome::Vetoed);
    assert_eq!(
        log.entries(),
        vec!["first:veto:0002/0006", "second:veto:0002/0006"]
    );
}

#[rstest]
fn vetoable_listeners_run_before_packet_listeners(attached: Attached) {
    let (processor, _transport) = attached;
    let log = CallLog::new();
    processor.add_packet_listener(Recorder::new("packets", &log));
    processor.add_vetoable_packet_listener(Recorder::new("veto", &log));

    assert_eq!(
        processor.process_packet(unsolicited(1, 1, 5)),
        DispatchOutcome::Delivered
    );
    assert_eq!(log.entries(), vec!["veto:veto:0001/0001", "packets:packet:0001/0001"]);
}

#[rstest]
fn changed_preprocessor_copy_replaces_packet(attached: Attached) {
    let (processor, _transport) = attached;
    let log = CallLog::new();
    processor.add_preprocessor(Arc::new(|packet: &mut MutableSnacPacket| -> ListenerResult {
        packet.set_subtype(packet.subtype() + 0x10);
        Ok(())
    }));
    processor.add_preprocessor(Arc::new(|packet: &mut MutableSnacPacket| -> ListenerResult {
        packet.set_family(packet.family() + 1);
        Ok(())
    }));
    processor.add_packet_listener(Recorder::new("packets", &log));

    processor.process_packet(unsolicited(0x0001, 0x0002, 3));
    assert_eq!(log.entries(), vec!["packets:packet:0002/0012"]);
}

#[rstest]
fn preprocessor_can_redirect_packet_to_outstanding_request(attached: Attached) -> TestResult {
    let (processor, _transport) = attached;
    let log = CallLog::new();
    let request = raw_request(1, 2);
    request.add_listener(Recorder::new("own", &log));
    let id = processor.send(&request)?;
    processor.add_preprocessor(Arc::new(move |packet: &mut MutableSnacPacket| -> ListenerResult {
        packet.set_request_id(id);
        Ok(())
    }));

    assert_eq!(
        processor.process_packet(unsolicited(1, 3, 0x8000_0000)),
        DispatchOutcome::Response(id)
    );
    assert_eq!(log.entries(), vec![format!("own:req-response:{}", id.as_u32())]);
    Ok(())
}

#[derive(Debug)]
struct Message(String);

impl SnacCommand for Message {
    fn family(&self) -> u16 { 0x0004 }

    fn subtype(&self) -> u16 { 0x0007 }

    fn write_payload(&self, out: &mut bytes::BytesMut) { out.extend_from_slice(self.0.as_bytes()); }
}

#[rstest]
fn decoded_command_is_attached_to_event(attached: Attached) {
    let (processor, _transport) = attached;
    let factory: Arc<dyn CommandFactory> = Arc::new(|packet: &SnacPacket| {
        let text = String::from_utf8(packet.payload().to_vec()).ok()?;
        Some(Arc::new(Message(text)) as Arc<dyn SnacCommand>)
    });
    processor.factories().register(CmdType::exact(0x0004, 0x0007), factory);

    let seen = CallLog::new();
    let sink = seen.clone();
    processor.add_packet_listener(Arc::new(move |event: &SnacPacketEvent| -> ListenerResult {
        let text = event
            .command()
            .and_then(|c| c.downcast_ref::<Message>())
            .map_or_else(|| "<none>".to_owned(), |m| m.0.clone());
        sink.push(text);
        Ok(())
    }));

    processor.process_packet(SnacPacket::new(0x0004, 0x0007, 0, RequestId::new(9), &b"hello"[..]));
    processor.process_packet(SnacPacket::new(0x0004, 0x0008, 0, RequestId::new(9), &b"hello"[..]));
    assert_eq!(seen.entries(), vec!["hello", "<none>"]);
}

#[rstest]
fn fallback_registry_decodes_when_own_registry_has_no_factory() {
    let fallback = Arc::new(snacframe::CommandFactoryRegistry::new());
    let factory: Arc<dyn CommandFactory> = Arc::new(|packet: &SnacPacket| {
        Some(Arc::new(RawCommand::new(packet.family(), packet.subtype(), Vec::new()))
            as Arc<dyn SnacCommand>)
    });
    fallback.register(CmdType::Any, factory);
    let processor = SnacProcessor::builder().fallback_factories(fallback).build();

    let seen = CallLog::new();
    let sink = seen.clone();
    processor.add_packet_listener(Arc::new(move |event: &SnacPacketEvent| -> ListenerResult {
        sink.push(format!("{}", event.command().is_some_and(|c| c.is::<RawCommand>())));
        Ok(())
    }));
    processor.process_packet(unsolicited(0x0009, 0x0001, 1));
    assert_eq!(seen.entries(), vec!["true"]);
}

#[rstest]
fn failing_packet_listeners_do_not_stop_dispatch(attached: Attached) {
    let (processor, transport) = attached;
    let log = CallLog::new();
    processor.add_packet_listener(failing(&log, "a"));
    processor.add_packet_listener(panicking(&log, "b"));
    processor.add_packet_listener(Recorder::new("c", &log));

    assert_eq!(
        processor.process_packet(unsolicited(1, 1, 1)),
        DispatchOutcome::Delivered
    );
    assert_eq!(log.entries(), vec!["a:failed", "b:panicked", "c:packet:0001/0001"]);

    let faults = transport.faults();
    assert_eq!(faults.len(), 2);
    assert!(faults.iter().all(|f| f.kind == FaultKind::PacketListener));
    assert!(!faults[0].panicked);
    assert_eq!(faults[0].message, "a refused");
    assert!(faults[1].panicked);
    assert_eq!(faults[1].message, "b exploded");
}

#[rstest]
fn failing_vetoable_listener_counts_as_continue(attached: Attached) {
    let (processor, transport) = attached;
    let log = CallLog::new();
    let veto: Arc<dyn VetoablePacketListener> =
        Arc::new(|_: &SnacPacketEvent| -> ListenerResult<Dispatch> { Err("nope".into()) });
    processor.add_vetoable_packet_listener(veto);
    processor.add_packet_listener(Recorder::new("packets", &log));

    processor.process_packet(unsolicited(1, 1, 1));
    assert_eq!(log.entries(), vec!["packets:packet:0001/0001"]);
    assert_eq!(transport.faults()[0].kind, FaultKind::PacketListener);
}

#[rstest]
fn failing_preprocessor_is_skipped(attached: Attached) {
    let (processor, transport) = attached;
    let log = CallLog::new();
    processor.add_preprocessor(Arc::new(|packet: &mut MutableSnacPacket| -> ListenerResult {
        packet.set_subtype(0x00ff);
        Err("half done".into())
    }));
    processor.add_packet_listener(Recorder::new("packets", &log));

    processor.process_packet(unsolicited(1, 1, 1));
    let faults = transport.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].kind, FaultKind::Preprocessor);
    assert_eq!(log.entries(), vec!["packets:packet:0001/00ff"]);
}

#[rstest]
fn response_listener_faults_are_classified(attached: Attached) -> TestResult {
    let (processor, transport) = attached;
    let log = CallLog::new();
    processor.add_global_response_listener(Arc::new(
        |_: &SnacResponseEvent| -> ListenerResult { Err("global broke".into()) },
    ));
    let request = raw_request(1, 2);
    request.add_listener(Arc::new(Exploding));
    request.add_listener(Recorder::new("own", &log));
    processor.send(&request)?;

    transport.deliver_snac(&reply_to(&transport.sent()[0]));
    let kinds: Vec<FaultKind> = transport.faults().iter().map(|f| f.kind).collect();
    assert_eq!(kinds, vec![FaultKind::ResponseListener, FaultKind::RequestListener]);
    assert_eq!(log.entries(), vec!["own:req-response:1"]);
    Ok(())
}

struct Exploding;

impl snacframe::SnacRequestListener for Exploding {
    fn handle_response(&self, _event: &SnacResponseEvent) -> ListenerResult {
        panic!("request listener exploded")
    }

    fn describe(&self) -> String { "exploding".into() }
}

#[rstest]
fn fault_context_names_the_listener(attached: Attached) {
    let (processor, transport) = attached;
    let log = CallLog::new();
    processor.add_vetoable_packet_listener(Arc::new(
        |_: &SnacPacketEvent| -> ListenerResult<Dispatch> { panic!("boom") },
    ));
    processor.add_packet_listener(Recorder::new("packets", &log));
    processor.process_packet(unsolicited(1, 1, 1));
    assert!(transport.faults()[0].context.contains("closure"));
}

#[rstest]
fn listener_changes_during_fan_out_apply_to_the_next_packet(attached: Attached) {
    let (processor, _transport) = attached;
    let log = CallLog::new();
    let late: Arc<dyn PacketListener> = Recorder::new("late", &log);
    let doomed: Arc<dyn PacketListener> = Recorder::new("doomed", &log);

    let owner = processor.downgrade();
    let (add, remove) = (Arc::clone(&late), Arc::clone(&doomed));
    let mutator_log = log.clone();
    let mutator: Arc<dyn PacketListener> = Arc::new(move |_: &SnacPacketEvent| -> ListenerResult {
        mutator_log.push("mutator");
        if let Some(processor) = owner.upgrade() {
            processor.add_packet_listener(Arc::clone(&add));
            processor.remove_packet_listener(&remove);
        }
        Ok(())
    });
    processor.add_packet_listener(Arc::clone(&mutator));
    processor.add_packet_listener(Arc::clone(&doomed));

    processor.process_packet(unsolicited(1, 1, 1));
    assert_eq!(log.take(), vec!["mutator", "doomed:packet:0001/0001"]);

    processor.process_packet(unsolicited(1, 1, 1));
    assert_eq!(log.take(), vec!["mutator", "late:packet:0001/0001"]);
}

#[rstest]
fn listener_may_send_from_inside_dispatch(attached: Attached) {
    let (processor, transport) = attached;
    let owner = processor.downgrade();
    processor.add_packet_listener(Arc::new(move |_: &SnacPacketEvent| -> ListenerResult {
        if let Some(processor) = owner.upgrade() {
            processor.send(&raw_request(0x0001, 0x0002))?;
        }
        Ok(())
    }));

    assert!(transport.deliver_snac(&unsolicited(1, 1, 0x8000_0002)));
    assert_eq!(transport.sent().len(), 1);
    assert!(transport.faults().is_empty());
}

#[rstest]
fn frames_on_other_channels_are_not_claimed(attached: Attached) {
    let (_processor, transport) = attached;
    assert!(!transport.deliver(&FlapPacket::new(1, vec![0u8; 4])));
    assert!(!transport.deliver(&FlapPacket::new(4, Vec::new())));
}
