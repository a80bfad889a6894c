//! Demo binary for `snacframe`.
//!
//! Sends a batch of requests through a loopback transport that answers each
//! one (or drops every Nth) and reports how they were resolved.

mod cli;

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use clap::Parser;
use parking_lot::Mutex;
use snacframe::{
    Dispatch,
    FlapPacket,
    FlapPacketListener,
    FlapTransport,
    ListenerFault,
    ListenerResult,
    OutgoingRequestListener,
    QueueManager,
    RateLimitedQueueManager,
    RawCommand,
    RequestSentEvent,
    RequestTimeoutEvent,
    ResponseListener,
    SnacPacket,
    SnacProcessor,
    SnacRequest,
    SnacResponseEvent,
};
use tracing::{debug, info, warn};

/// Transport that answers every SNAC it sends with a packet carrying the same
/// request id, unless told to drop it.
struct Loopback {
    listeners: Mutex<Vec<Arc<dyn FlapPacketListener>>>,
    sent: AtomicU32,
    drop_every: Option<u32>,
}

impl Loopback {
    fn new(drop_every: Option<u32>) -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            sent: AtomicU32::new(0),
            drop_every: drop_every.filter(|n| *n > 0),
        }
    }

    fn deliver(&self, frame: &FlapPacket) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            if listener.handle_flap(frame) == Dispatch::Stop {
                return;
            }
        }
        debug!(channel = frame.channel(), "frame not claimed");
    }
}

impl FlapTransport for Loopback {
    fn add_vetoable_listener(&self, listener: Arc<dyn FlapPacketListener>) {
        self.listeners.lock().push(listener);
    }

    fn remove_vetoable_listener(&self, listener: &Arc<dyn FlapPacketListener>) {
        self.listeners.lock().retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn send_snac(&self, packet: SnacPacket) {
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        if self.drop_every.is_some_and(|k| n % k == 0) {
            debug!(id = %packet.request_id(), "dropping request");
            return;
        }
        let reply = SnacPacket::new(
            packet.family(),
            packet.subtype().wrapping_add(1),
            0,
            packet.request_id(),
            packet.payload().clone(),
        );
        self.deliver(&FlapPacket::from_snac(&reply));
    }

    fn report_error(&self, fault: &ListenerFault) {
        warn!(error = %fault, "listener fault");
    }
}

#[derive(Default)]
struct Tally {
    sent: AtomicU32,
    answered: AtomicU32,
    timed_out: AtomicU32,
}

impl OutgoingRequestListener for Tally {
    fn handle_sent(&self, _event: &RequestSentEvent) -> ListenerResult {
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn handle_timeout(&self, _event: &RequestTimeoutEvent) -> ListenerResult {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl ResponseListener for Tally {
    fn handle_response(&self, _event: &SnacResponseEvent) -> ListenerResult {
        self.answered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Enable structured logging for the demo.
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let processor = SnacProcessor::builder()
        .request_ttl(Duration::from_secs(cli.ttl))
        .build();

    if let Some(rate) = cli.rate {
        let manager: Arc<dyn QueueManager> =
            Arc::new(RateLimitedQueueManager::builder().rate(rate).build()?);
        processor.set_queue_manager(Some(manager));
    }

    let tally = Arc::new(Tally::default());
    processor.add_global_request_listener(Arc::clone(&tally) as Arc<dyn OutgoingRequestListener>);
    processor.add_global_response_listener(Arc::clone(&tally) as Arc<dyn ResponseListener>);
    processor.attach(Arc::new(Loopback::new(cli.drop_every)));

    for i in 0..cli.requests {
        let command = RawCommand::new(0x0001, 0x0006, i.to_be_bytes().to_vec());
        processor.send(&SnacRequest::new(Arc::new(command)))?;
    }
    while tally.sent.load(Ordering::Relaxed) < cli.requests {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let outstanding = processor.outstanding_requests();
    processor.detach();

    info!(
        sent = tally.sent.load(Ordering::Relaxed),
        answered = tally.answered.load(Ordering::Relaxed),
        timed_out = tally.timed_out.load(Ordering::Relaxed),
        outstanding,
        "done"
    );
    println!(
        "sent {} answered {} timed out {}",
        tally.sent.load(Ordering::Relaxed),
        tally.answered.load(Ordering::Relaxed),
        tally.timed_out.load(Ordering::Relaxed),
    );
    Ok(())
}
