//! Packet-availability event delivery
//!
//! Each open interface gets one serial queue dedicated to its events. The
//! host posts callbacks on that queue; each callback is turned into an
//! [`InterfaceEvent`] and handed to the caller's [`EventSink`] before the
//! next one runs.

use crate::dispatch::SerialQueue;
use crate::error::Result;
use crate::host::{EventKind, EventRegistration, HostEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Sender, SyncSender};
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

const EVENT_QUEUE_LABEL: &str = "vnic.events";

/// Event delivered to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceEvent {
    pub kind: EventKind,
    /// Host's estimate of packets ready to read; not a promise
    pub estimated_packets: u64,
}

/// Receiver of interface events
///
/// Called on the interface's event queue, one event at a time.
pub trait EventSink: Send + Sync + 'static {
    fn on_event(&self, event: InterfaceEvent);
}

impl<F> EventSink for F
where
    F: Fn(InterfaceEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: InterfaceEvent) {
        self(event)
    }
}

impl EventSink for Sender<InterfaceEvent> {
    fn on_event(&self, event: InterfaceEvent) {
        // A consumer that hung up just stops receiving.
        let _ = self.send(event);
    }
}

impl EventSink for SyncSender<InterfaceEvent> {
    fn on_event(&self, event: InterfaceEvent) {
        let _ = self.send(event);
    }
}

/// Owner of an interface's event queue
pub struct EventNotifier {
    identifier: Uuid,
    queue: SerialQueue,
    sink: Arc<dyn EventSink>,
    delivered: Arc<AtomicU64>,
}

impl EventNotifier {
    /// Create the event queue for `identifier`
    pub fn start(identifier: Uuid, sink: Arc<dyn EventSink>) -> Result<Self> {
        let queue = SerialQueue::new(EVENT_QUEUE_LABEL)?;
        debug!(%identifier, "event notifier started");
        Ok(EventNotifier {
            identifier,
            queue,
            sink,
            delivered: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Callback and queue to register with the host
    pub fn registration(&self) -> EventRegistration {
        let sink = self.sink.clone();
        let delivered = self.delivered.clone();
        let identifier = self.identifier;

        EventRegistration {
            queue: self.queue.handle(),
            callback: Arc::new(move |code: u32, event: HostEvent| {
                let event = InterfaceEvent {
                    kind: EventKind::from_code(code),
                    estimated_packets: event.estimated_packets,
                };
                trace!(%identifier, kind = ?event.kind, estimated = event.estimated_packets, "interface event");
                sink.on_event(event);
                delivered.fetch_add(1, Ordering::Relaxed);
            }),
        }
    }

    /// Events handed to the sink so far
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Release the event queue
    ///
    /// Events already posted still reach the sink; this returns once the last
    /// of them has.
    pub fn release(self) {
        let delivered = self.delivered();
        let identifier = self.identifier;
        self.queue.release();
        debug!(%identifier, delivered, "event notifier released");
    }
}
